//! Ownership ledger (`agentpack.lock.json`)
//!
//! The ledger is the persisted record of which package installed which
//! workspace files. Each entry maps a registry-relative key (a trailing
//! slash denotes a whole directory) to the workspace-relative paths it
//! produced. The at-most-one-owner-per-path invariant is enforced by the
//! conflict resolver, not by this format.
//!
//! The ledger is read at the start of conflict resolution and subsumption
//! checks and written after each successful per-package install or
//! removal. It is not safe for concurrent cross-process writers; callers
//! serialize install runs per workspace.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentpackError, Result};

/// Ledger file name at the workspace root
pub const LEDGER_FILE: &str = "agentpack.lock.json";

const LEDGER_FORMAT_VERSION: u32 = 1;

/// One package's persisted ownership record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Declared source of the package (source key)
    pub path: String,

    /// Resolved version, when the package is versioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Content hash of the installed payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// registry-relative key -> workspace-relative installed paths.
    /// A key ending in `/` claims a whole subtree.
    #[serde(default)]
    pub files: BTreeMap<String, Vec<String>>,
}

impl LedgerEntry {
    /// All workspace-relative paths this entry claims
    pub fn owned_paths(&self) -> impl Iterator<Item = &str> {
        self.files.values().flatten().map(String::as_str)
    }

    /// True when this entry claims `rel` (exactly, or via a directory claim)
    pub fn owns(&self, rel: &str) -> bool {
        self.owned_paths()
            .any(|owned| owned == rel || (owned.ends_with('/') && rel.starts_with(owned)))
    }

    /// True when the workspace path recorded for `rel` differs from its
    /// registry-relative key, i.e. the file was installed under a
    /// namespaced path.
    pub fn is_namespaced(&self, rel: &str) -> bool {
        self.files
            .iter()
            .any(|(key, paths)| paths.iter().any(|p| p == rel) && key != rel)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    packages: BTreeMap<String, LedgerEntry>,
}

/// Persisted mapping from package name to ownership record
#[derive(Debug, Clone, Default)]
pub struct OwnershipLedger {
    /// Entries keyed by package name
    pub packages: BTreeMap<String, LedgerEntry>,
}

impl OwnershipLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the ledger from a workspace root; a missing file is an empty
    /// ledger, not an error.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let path = workspace_root.join(LEDGER_FILE);
        if !path.is_file() {
            return Ok(Self::new());
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| AgentpackError::LedgerReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let file: LedgerFile =
            serde_json::from_str(&content).map_err(|e| AgentpackError::LedgerParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            packages: file.packages,
        })
    }

    /// Persist the ledger to the workspace root (pretty-printed, sorted)
    pub fn save(&self, workspace_root: &Path) -> Result<()> {
        let path = workspace_root.join(LEDGER_FILE);

        let mut packages = self.packages.clone();
        for entry in packages.values_mut() {
            for paths in entry.files.values_mut() {
                paths.sort();
            }
        }

        let file = LedgerFile {
            version: LEDGER_FORMAT_VERSION,
            packages,
        };

        let json =
            serde_json::to_string_pretty(&file).map_err(|e| AgentpackError::LedgerWriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        std::fs::write(&path, json).map_err(|e| AgentpackError::LedgerWriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Find the package owning a workspace-relative path, if any
    pub fn owner_of(&self, rel: &str) -> Option<&str> {
        self.packages
            .iter()
            .find(|(_, entry)| entry.owns(rel))
            .map(|(name, _)| name.as_str())
    }

    /// Look up a package entry
    pub fn entry(&self, name: &str) -> Option<&LedgerEntry> {
        self.packages.get(name)
    }

    /// Look up a package entry mutably
    pub fn entry_mut(&mut self, name: &str) -> Option<&mut LedgerEntry> {
        self.packages.get_mut(name)
    }

    /// Insert or replace a package entry
    pub fn record(&mut self, name: impl Into<String>, entry: LedgerEntry) {
        self.packages.insert(name.into(), entry);
    }

    /// Remove a package entry, returning it when present
    pub fn remove(&mut self, name: &str) -> Option<LedgerEntry> {
        self.packages.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry_with_file(rel: &str) -> LedgerEntry {
        LedgerEntry {
            path: "registry:test".to_string(),
            version: Some("1.0.0".to_string()),
            hash: None,
            files: BTreeMap::from([(rel.to_string(), vec![rel.to_string()])]),
        }
    }

    #[test]
    fn test_load_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let ledger = OwnershipLedger::load(temp.path()).unwrap();
        assert!(ledger.packages.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp = TempDir::new().unwrap();

        let mut ledger = OwnershipLedger::new();
        ledger.record("pack-a", entry_with_file("rules/a.md"));
        ledger.save(temp.path()).unwrap();

        let loaded = OwnershipLedger::load(temp.path()).unwrap();
        assert_eq!(loaded.packages.len(), 1);
        assert_eq!(
            loaded.entry("pack-a").unwrap().version.as_deref(),
            Some("1.0.0")
        );
    }

    #[test]
    fn test_owner_of_exact_path() {
        let mut ledger = OwnershipLedger::new();
        ledger.record("pack-a", entry_with_file("rules/a.md"));

        assert_eq!(ledger.owner_of("rules/a.md"), Some("pack-a"));
        assert_eq!(ledger.owner_of("rules/b.md"), None);
    }

    #[test]
    fn test_owner_of_directory_claim() {
        let mut ledger = OwnershipLedger::new();
        let entry = LedgerEntry {
            path: "registry:test".to_string(),
            version: None,
            hash: None,
            files: BTreeMap::from([("skills/".to_string(), vec!["skills/".to_string()])]),
        };
        ledger.record("pack-a", entry);

        assert_eq!(ledger.owner_of("skills/deploy/SKILL.md"), Some("pack-a"));
        assert_eq!(ledger.owner_of("rules/a.md"), None);
    }

    #[test]
    fn test_is_namespaced() {
        let entry = LedgerEntry {
            path: "registry:test".to_string(),
            version: None,
            hash: None,
            files: BTreeMap::from([(
                "rules/a.md".to_string(),
                vec!["rules/acme/a.md".to_string()],
            )]),
        };
        assert!(entry.is_namespaced("rules/acme/a.md"));
        assert!(!entry_with_file("rules/a.md").is_namespaced("rules/a.md"));
    }

    #[test]
    fn test_remove_entry() {
        let mut ledger = OwnershipLedger::new();
        ledger.record("pack-a", entry_with_file("rules/a.md"));

        assert!(ledger.remove("pack-a").is_some());
        assert!(ledger.remove("pack-a").is_none());
        assert_eq!(ledger.owner_of("rules/a.md"), None);
    }

    #[test]
    fn test_corrupt_ledger_is_parse_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(LEDGER_FILE), "not json").unwrap();

        let result = OwnershipLedger::load(temp.path());
        assert!(matches!(
            result,
            Err(AgentpackError::LedgerParseFailed { .. })
        ));
    }
}
