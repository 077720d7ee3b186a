//! Target planning for package installs
//!
//! Maps a loaded package's content root to the set of workspace-relative
//! paths it intends to write. Platform-format conversion happens in a
//! collaborator pipeline; the default mapper mirrors registry-relative
//! paths one-to-one and tags each target with the output pattern that
//! produced it, which the conflict resolver later uses to place namespace
//! segments.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use wax::{CandidatePath, Glob, Pattern};

use crate::error::Result;
use crate::ledger::LEDGER_FILE;
use crate::manifest::MANIFEST_FILE;

/// One file a package intends to write
#[derive(Debug, Clone)]
pub struct PlannedTarget {
    /// Absolute path of the file inside the package content root
    pub source_path: PathBuf,

    /// Registry-relative path, which is also the intended
    /// workspace-relative path before conflict resolution
    pub relative: String,

    /// Output pattern that produced this target, when known
    pub pattern: Option<String>,

    /// Merge-target flag: content is combined from multiple packages by a
    /// collaborator and must never be namespaced
    pub merge: bool,
}

/// Collaborator port: plans the final write set for one package.
///
/// `resource` narrows a resource-scoped install to one subtree of the
/// package; planned paths stay registry-relative either way, so a scoped
/// install and a whole-package install write the same canonical paths.
pub trait TargetMapper {
    fn plan_targets(&self, content_root: &Path, resource: Option<&str>)
    -> Result<Vec<PlannedTarget>>;
}

/// Default mapper: enumerate the content root and keep files matching the
/// configured output patterns, mirrored one-to-one into the workspace.
pub struct DirectTargetMapper {
    output_patterns: Vec<String>,
    merge_patterns: Vec<String>,
}

impl DirectTargetMapper {
    /// Mapper with the standard resource layout of configuration packages
    pub fn new() -> Self {
        Self {
            output_patterns: vec![
                "agents/**".to_string(),
                "commands/**".to_string(),
                "rules/**".to_string(),
                "skills/**".to_string(),
            ],
            merge_patterns: vec!["mcp.json".to_string()],
        }
    }

    /// Mapper with explicit output and merge patterns
    pub fn with_patterns(output_patterns: Vec<String>, merge_patterns: Vec<String>) -> Self {
        Self {
            output_patterns,
            merge_patterns,
        }
    }

    fn matching_pattern(&self, rel: &str) -> Option<&str> {
        let candidate = CandidatePath::from(rel);
        self.output_patterns
            .iter()
            .find(|pattern| match Glob::new(pattern) {
                Ok(glob) => glob.matched(&candidate).is_some(),
                Err(_) => pattern.as_str() == rel,
            })
            .map(String::as_str)
    }

    fn is_merge_target(&self, rel: &str) -> bool {
        let candidate = CandidatePath::from(rel);
        self.merge_patterns.iter().any(|pattern| {
            match Glob::new(pattern) {
                Ok(glob) => glob.matched(&candidate).is_some(),
                Err(_) => pattern.as_str() == rel,
            }
        })
    }
}

impl Default for DirectTargetMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetMapper for DirectTargetMapper {
    fn plan_targets(
        &self,
        content_root: &Path,
        resource: Option<&str>,
    ) -> Result<Vec<PlannedTarget>> {
        let mut targets = Vec::new();
        let resource = resource.map(|r| r.trim_end_matches('/'));

        for entry in WalkDir::new(content_root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let rel = entry
                .path()
                .strip_prefix(content_root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            if rel == MANIFEST_FILE || rel == LEDGER_FILE {
                continue;
            }

            if let Some(scope) = resource {
                if rel != scope && !rel.starts_with(&format!("{scope}/")) {
                    continue;
                }
            }

            if self.is_merge_target(&rel) {
                targets.push(PlannedTarget {
                    source_path: entry.path().to_path_buf(),
                    relative: rel,
                    pattern: None,
                    merge: true,
                });
                continue;
            }

            let Some(pattern) = self.matching_pattern(&rel) else {
                continue;
            };

            targets.push(PlannedTarget {
                source_path: entry.path().to_path_buf(),
                relative: rel,
                pattern: Some(pattern.to_string()),
                merge: false,
            });
        }

        targets.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_pack(files: &[&str]) -> TempDir {
        let temp = TempDir::new().unwrap();
        for file in files {
            let path = temp.path().join(file);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, "content").unwrap();
        }
        temp
    }

    #[test]
    fn test_plan_targets_mirrors_resource_paths() {
        let pack = make_pack(&["rules/a.md", "rules/git/b.md", "agents/helper.md"]);
        let mapper = DirectTargetMapper::new();

        let targets = mapper.plan_targets(pack.path(), None).unwrap();
        let rels: Vec<&str> = targets.iter().map(|t| t.relative.as_str()).collect();

        assert_eq!(rels, vec!["agents/helper.md", "rules/a.md", "rules/git/b.md"]);
        assert!(targets.iter().all(|t| t.pattern.is_some()));
    }

    #[test]
    fn test_manifest_and_unmatched_files_excluded() {
        let pack = make_pack(&["rules/a.md", "agentpack.yaml", "README.md"]);
        let mapper = DirectTargetMapper::new();

        let targets = mapper.plan_targets(pack.path(), None).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].relative, "rules/a.md");
    }

    #[test]
    fn test_merge_targets_flagged() {
        let pack = make_pack(&["rules/a.md", "mcp.json"]);
        let mapper = DirectTargetMapper::new();

        let targets = mapper.plan_targets(pack.path(), None).unwrap();
        let merge: Vec<&PlannedTarget> = targets.iter().filter(|t| t.merge).collect();

        assert_eq!(merge.len(), 1);
        assert_eq!(merge[0].relative, "mcp.json");
    }

    #[test]
    fn test_resource_scope_filters_but_keeps_paths() {
        let pack = make_pack(&["agents/a1/AGENT.md", "agents/a2.md", "rules/a.md"]);
        let mapper = DirectTargetMapper::new();

        let targets = mapper.plan_targets(pack.path(), Some("agents/a1")).unwrap();
        let rels: Vec<&str> = targets.iter().map(|t| t.relative.as_str()).collect();

        // Scoped to one resource, but paths stay registry-relative
        assert_eq!(rels, vec!["agents/a1/AGENT.md"]);
    }

    #[test]
    fn test_custom_patterns() {
        let pack = make_pack(&["prompts/x.md", "rules/a.md"]);
        let mapper =
            DirectTargetMapper::with_patterns(vec!["prompts/**/*.md".to_string()], vec![]);

        let targets = mapper.plan_targets(pack.path(), None).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].relative, "prompts/x.md");
        assert_eq!(targets[0].pattern.as_deref(), Some("prompts/**/*.md"));
    }
}
