//! Subsumption resolution
//!
//! Detects that an incoming install's name is a path-prefix ancestor or
//! descendant of an already-installed name from the same source. A
//! whole-package install subsumes its previously installed resource-scoped
//! entries (upgrade); a resource-scoped install under an existing
//! whole-package entry is already covered and writes nothing. The lookup
//! is based purely on name-prefix relationships, not on caller intent.

use std::path::Path;

use crate::error::{AgentpackError, Result};
use crate::ledger::OwnershipLedger;
use crate::source::{PackageSource, name};

/// Outcome of the subsumption check for one incoming install
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubsumptionResult {
    /// No overlap; proceed normally
    None,
    /// The incoming install subsumes these existing entries; remove them
    /// before installing so the canonical paths are free
    Upgrade { entries_to_remove: Vec<String> },
    /// A broader install from the same source already covers the incoming
    /// resource; write nothing
    AlreadyCovered { covering_package: String },
}

/// Check an incoming install against the ledger.
pub fn check(
    incoming_name: &str,
    incoming_source: &PackageSource,
    ledger: &OwnershipLedger,
) -> SubsumptionResult {
    let incoming_key = incoming_source.source_key();

    let mut descendants: Vec<String> = Vec::new();
    let mut covering: Option<String> = None;

    for (entry_name, entry) in &ledger.packages {
        if entry_name == incoming_name {
            continue;
        }
        if !same_source(incoming_source, &incoming_key, entry_name, &entry.path) {
            continue;
        }

        if name::is_strict_descendant(entry_name, incoming_name) {
            descendants.push(entry_name.clone());
        } else if covering.is_none() && name::is_strict_descendant(incoming_name, entry_name) {
            covering = Some(entry_name.clone());
        }
    }

    if !descendants.is_empty() {
        return SubsumptionResult::Upgrade {
            entries_to_remove: descendants,
        };
    }

    if let Some(covering_package) = covering {
        return SubsumptionResult::AlreadyCovered { covering_package };
    }

    SubsumptionResult::None
}

/// Same-source test per source-type rule: git entries match on the repo
/// key, path entries on a path prefix, registry entries on the base name.
fn same_source(
    incoming: &PackageSource,
    incoming_key: &str,
    entry_name: &str,
    entry_key: &str,
) -> bool {
    match incoming {
        PackageSource::Git { .. } => entry_key == incoming_key,
        PackageSource::Path { .. } => {
            entry_key == incoming_key
                || entry_key.starts_with(&format!("{incoming_key}/"))
                || incoming_key.starts_with(&format!("{entry_key}/"))
        }
        PackageSource::Registry { name: pkg_name, .. } => {
            name::base_name(entry_name) == name::base_name(pkg_name)
        }
    }
}

/// Collaborator port: removes an installed package from the workspace.
/// Subsumption upgrades route through this before installing.
pub trait PackageRemover {
    fn remove(
        &self,
        package: &str,
        ledger: &mut OwnershipLedger,
        workspace_root: &Path,
    ) -> Result<()>;
}

/// Default remover: deletes the entry's owned files, prunes emptied
/// directories, and drops the ledger entry. The caller persists the
/// ledger afterwards.
pub struct WorkspaceRemover;

impl PackageRemover for WorkspaceRemover {
    fn remove(
        &self,
        package: &str,
        ledger: &mut OwnershipLedger,
        workspace_root: &Path,
    ) -> Result<()> {
        let Some(entry) = ledger.remove(package) else {
            return Err(AgentpackError::PackageNotFound {
                name: package.to_string(),
            });
        };

        for owned in entry.owned_paths() {
            let full = workspace_root.join(owned);
            if owned.ends_with('/') {
                if full.is_dir() {
                    std::fs::remove_dir_all(&full).map_err(|e| {
                        AgentpackError::FileWriteFailed {
                            path: full.display().to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                }
            } else if full.is_file() {
                std::fs::remove_file(&full).map_err(|e| AgentpackError::FileWriteFailed {
                    path: full.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
            prune_empty_dirs(full.parent(), workspace_root);
        }

        Ok(())
    }
}

/// Remove now-empty directories up to (but excluding) the workspace root
fn prune_empty_dirs(start: Option<&Path>, workspace_root: &Path) {
    let mut current = start;
    while let Some(dir) = current {
        if dir == workspace_root || !dir.starts_with(workspace_root) {
            break;
        }
        let is_empty = std::fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty || std::fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}
