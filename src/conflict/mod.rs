//! Conflict and ownership resolution
//!
//! Every target path a package intends to write is classified against the
//! ownership ledger and the workspace, then the configured strategy
//! decides the outcome. The namespace strategy is all-or-nothing within
//! one package install: if any single target conflicts, every non-merge
//! target in the batch is namespaced together, so a package's output
//! stays internally consistent. Merge targets are combined at key level
//! by a collaborator and are never namespaced.

use std::path::Path;

use crate::error::Result;
use crate::install::targets::PlannedTarget;
use crate::ledger::OwnershipLedger;
use crate::options::ConflictStrategy;
use crate::source::name;

/// Classification of one target path against the ledger and workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetClaim {
    /// No ledger entry claims this path and nothing exists on disk
    Free,
    /// The installing package already owns this exact path (update)
    OwnedBySelf,
    /// A different package's ledger entry claims this path
    OwnedByOther { owner: String },
    /// The path exists on disk but no ledger entry claims it
    ExistsUnowned,
}

impl TargetClaim {
    /// True for the claims that count as conflicts
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            TargetClaim::OwnedByOther { .. } | TargetClaim::ExistsUnowned
        )
    }
}

/// Classify one workspace-relative path for the given installing package
pub fn classify(
    ledger: &OwnershipLedger,
    package: &str,
    rel: &str,
    workspace_root: &Path,
) -> TargetClaim {
    match ledger.owner_of(rel) {
        Some(owner) if owner == package => TargetClaim::OwnedBySelf,
        Some(owner) => TargetClaim::OwnedByOther {
            owner: owner.to_string(),
        },
        None => {
            if workspace_root.join(rel).exists() {
                TargetClaim::ExistsUnowned
            } else {
                TargetClaim::Free
            }
        }
    }
}

/// One target with its resolved destination
#[derive(Debug, Clone)]
pub struct ResolvedWrite {
    pub target: PlannedTarget,
    /// Final workspace-relative path (equals `target.relative` unless
    /// the write was remapped)
    pub destination: String,
}

/// Relocation of a previous owner's file off a contested path
#[derive(Debug, Clone)]
pub struct Relocation {
    pub owner: String,
    pub from: String,
    pub to: String,
}

/// Outcome of resolving one package's whole write set
#[derive(Debug, Clone, Default)]
pub struct ConflictResolution {
    pub writes: Vec<ResolvedWrite>,
    pub dropped: Vec<PlannedTarget>,
    /// Set when the batch was namespaced as a whole
    pub was_namespaced: bool,
    pub namespace_dir: Option<String>,
    pub relocations: Vec<Relocation>,
}

/// Injected port for the `Ask` strategy. Absent port degrades to `Skip`.
pub trait ConflictDecision {
    /// Decide a strategy for the conflicting paths of one package install
    fn decide(&self, package: &str, conflicts: &[String]) -> Result<ConflictStrategy>;
}

/// Resolve one package's planned targets against the ledger and workspace
pub fn resolve_targets(
    package: &str,
    targets: &[PlannedTarget],
    ledger: &OwnershipLedger,
    workspace_root: &Path,
    strategy: ConflictStrategy,
    decision: Option<&dyn ConflictDecision>,
) -> Result<ConflictResolution> {
    let conflicts: Vec<String> = targets
        .iter()
        .filter(|t| !t.merge)
        .filter(|t| classify(ledger, package, &t.relative, workspace_root).is_conflict())
        .map(|t| t.relative.clone())
        .collect();

    if conflicts.is_empty() {
        return Ok(pass_through(targets));
    }

    match strategy {
        ConflictStrategy::Overwrite => Ok(pass_through(targets)),
        ConflictStrategy::Skip => Ok(skip_conflicting(targets, &conflicts)),
        ConflictStrategy::Namespace => Ok(namespace_batch(
            package,
            targets,
            ledger,
            workspace_root,
        )),
        ConflictStrategy::Ask => {
            let chosen = match decision {
                Some(port) => match port.decide(package, &conflicts)? {
                    // A port answering `Ask` again would loop; treat as skip
                    ConflictStrategy::Ask => ConflictStrategy::Skip,
                    other => other,
                },
                None => ConflictStrategy::Skip,
            };
            resolve_targets(package, targets, ledger, workspace_root, chosen, None)
        }
    }
}

fn pass_through(targets: &[PlannedTarget]) -> ConflictResolution {
    ConflictResolution {
        writes: targets
            .iter()
            .map(|t| ResolvedWrite {
                destination: t.relative.clone(),
                target: t.clone(),
            })
            .collect(),
        ..ConflictResolution::default()
    }
}

fn skip_conflicting(targets: &[PlannedTarget], conflicts: &[String]) -> ConflictResolution {
    let mut resolution = ConflictResolution::default();
    for target in targets {
        if !target.merge && conflicts.contains(&target.relative) {
            resolution.dropped.push(target.clone());
        } else {
            resolution.writes.push(ResolvedWrite {
                destination: target.relative.clone(),
                target: target.clone(),
            });
        }
    }
    resolution
}

/// Namespace the whole batch: partial namespacing within one package's
/// install is not permitted.
fn namespace_batch(
    package: &str,
    targets: &[PlannedTarget],
    ledger: &OwnershipLedger,
    workspace_root: &Path,
) -> ConflictResolution {
    let namespace = name::namespace_slug(package);
    let mut resolution = ConflictResolution {
        was_namespaced: true,
        namespace_dir: Some(namespace.clone()),
        ..ConflictResolution::default()
    };

    for target in targets {
        if target.merge {
            // Merge targets are combined at key level elsewhere
            resolution.writes.push(ResolvedWrite {
                destination: target.relative.clone(),
                target: target.clone(),
            });
            continue;
        }

        let destination =
            generate_namespaced_path(&target.relative, &namespace, target.pattern.as_deref());

        // A namespace slug can collide with a path another package
        // already owns canonically. Neither claim silently wins: the
        // previous owner's file moves to its own namespaced path, unless
        // it was already namespaced, in which case the incoming target
        // is dropped.
        match classify(ledger, package, &destination, workspace_root) {
            TargetClaim::OwnedByOther { owner } => {
                let Some(entry) = ledger.entry(&owner) else {
                    resolution.dropped.push(target.clone());
                    continue;
                };
                if entry.is_namespaced(&destination) {
                    resolution.dropped.push(target.clone());
                    continue;
                }
                let owner_slug = name::namespace_slug(&owner);
                resolution.relocations.push(Relocation {
                    owner: owner.clone(),
                    from: destination.clone(),
                    to: generate_namespaced_path(
                        &destination,
                        &owner_slug,
                        target.pattern.as_deref(),
                    ),
                });
                resolution.writes.push(ResolvedWrite {
                    destination,
                    target: target.clone(),
                });
            }
            _ => {
                resolution.writes.push(ResolvedWrite {
                    destination,
                    target: target.clone(),
                });
            }
        }
    }

    resolution
}

/// Insert `namespace` as an extra segment into `rel`.
///
/// With a pattern, the segment goes immediately after the pattern's
/// longest literal (non-wildcard) prefix; without one, after the path's
/// first segment; a single-segment path gets the namespace prepended.
pub fn generate_namespaced_path(rel: &str, namespace: &str, pattern: Option<&str>) -> String {
    if let Some(pattern) = pattern {
        if let Some(prefix) = literal_prefix(pattern) {
            if let Some(rest) = rel.strip_prefix(&prefix) {
                if !rest.is_empty() {
                    return format!("{prefix}{namespace}/{rest}");
                }
            }
        }
    }

    match rel.split_once('/') {
        Some((first, rest)) => format!("{first}/{namespace}/{rest}"),
        None => format!("{namespace}/{rel}"),
    }
}

/// Longest literal (wildcard-free) path prefix of a glob pattern,
/// including its trailing slash. `rules/**/*.md` -> `rules/`.
pub fn literal_prefix(pattern: &str) -> Option<String> {
    let mut prefix = String::new();
    for segment in pattern.split('/') {
        if segment.is_empty() || segment.chars().any(|c| matches!(c, '*' | '?' | '[' | '{')) {
            break;
        }
        prefix.push_str(segment);
        prefix.push('/');
    }

    if prefix.is_empty() { None } else { Some(prefix) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerEntry;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn target(rel: &str, pattern: Option<&str>) -> PlannedTarget {
        PlannedTarget {
            source_path: PathBuf::from("/src").join(rel),
            relative: rel.to_string(),
            pattern: pattern.map(str::to_string),
            merge: false,
        }
    }

    fn merge_target(rel: &str) -> PlannedTarget {
        PlannedTarget {
            source_path: PathBuf::from("/src").join(rel),
            relative: rel.to_string(),
            pattern: None,
            merge: true,
        }
    }

    fn ledger_with(owner: &str, rel: &str) -> OwnershipLedger {
        let mut ledger = OwnershipLedger::new();
        ledger.record(
            owner,
            LedgerEntry {
                path: "test".to_string(),
                version: None,
                hash: None,
                files: BTreeMap::from([(rel.to_string(), vec![rel.to_string()])]),
            },
        );
        ledger
    }

    #[test]
    fn test_generate_namespaced_path_with_pattern() {
        assert_eq!(
            generate_namespaced_path("rules/git/commits.md", "acme", Some("rules/**/*.md")),
            "rules/acme/git/commits.md"
        );
    }

    #[test]
    fn test_generate_namespaced_path_without_pattern() {
        assert_eq!(generate_namespaced_path("foo.mdc", "acme", None), "acme/foo.mdc");
        assert_eq!(
            generate_namespaced_path("rules/foo.md", "acme", None),
            "rules/acme/foo.md"
        );
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("rules/**/*.md"), Some("rules/".to_string()));
        assert_eq!(
            literal_prefix("skills/deploy/*.md"),
            Some("skills/deploy/".to_string())
        );
        assert_eq!(literal_prefix("**/*.md"), None);
    }

    #[test]
    fn test_classify() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_with("pack-a", "rules/a.md");

        assert_eq!(
            classify(&ledger, "pack-a", "rules/a.md", temp.path()),
            TargetClaim::OwnedBySelf
        );
        assert_eq!(
            classify(&ledger, "pack-b", "rules/a.md", temp.path()),
            TargetClaim::OwnedByOther {
                owner: "pack-a".to_string()
            }
        );
        assert_eq!(
            classify(&ledger, "pack-b", "rules/b.md", temp.path()),
            TargetClaim::Free
        );

        std::fs::create_dir_all(temp.path().join("rules")).unwrap();
        std::fs::write(temp.path().join("rules/user.md"), "mine").unwrap();
        assert_eq!(
            classify(&ledger, "pack-b", "rules/user.md", temp.path()),
            TargetClaim::ExistsUnowned
        );
    }

    #[test]
    fn test_no_conflict_passes_through() {
        let temp = TempDir::new().unwrap();
        let ledger = OwnershipLedger::new();
        let targets = vec![target("rules/a.md", Some("rules/**"))];

        let resolution = resolve_targets(
            "pack-q",
            &targets,
            &ledger,
            temp.path(),
            ConflictStrategy::Namespace,
            None,
        )
        .unwrap();

        assert!(!resolution.was_namespaced);
        assert_eq!(resolution.writes[0].destination, "rules/a.md");
    }

    #[test]
    fn test_bulk_namespacing_is_all_or_nothing() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_with("pack-p", "rules/a.md");
        let targets = vec![
            target("rules/a.md", Some("rules/**")),
            target("rules/b.md", Some("rules/**")),
            merge_target("mcp.json"),
        ];

        let resolution = resolve_targets(
            "pack-q",
            &targets,
            &ledger,
            temp.path(),
            ConflictStrategy::Namespace,
            None,
        )
        .unwrap();

        assert!(resolution.was_namespaced);
        assert_eq!(resolution.namespace_dir.as_deref(), Some("pack-q"));

        let destinations: Vec<&str> = resolution
            .writes
            .iter()
            .map(|w| w.destination.as_str())
            .collect();
        // Both regular targets namespaced identically; merge target never
        assert!(destinations.contains(&"rules/pack-q/a.md"));
        assert!(destinations.contains(&"rules/pack-q/b.md"));
        assert!(destinations.contains(&"mcp.json"));
    }

    #[test]
    fn test_skip_drops_only_conflicting() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_with("pack-p", "rules/a.md");
        let targets = vec![
            target("rules/a.md", Some("rules/**")),
            target("rules/b.md", Some("rules/**")),
        ];

        let resolution = resolve_targets(
            "pack-q",
            &targets,
            &ledger,
            temp.path(),
            ConflictStrategy::Skip,
            None,
        )
        .unwrap();

        assert_eq!(resolution.writes.len(), 1);
        assert_eq!(resolution.writes[0].destination, "rules/b.md");
        assert_eq!(resolution.dropped.len(), 1);
    }

    #[test]
    fn test_overwrite_ignores_claims() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_with("pack-p", "rules/a.md");
        let targets = vec![target("rules/a.md", Some("rules/**"))];

        let resolution = resolve_targets(
            "pack-q",
            &targets,
            &ledger,
            temp.path(),
            ConflictStrategy::Overwrite,
            None,
        )
        .unwrap();

        assert_eq!(resolution.writes[0].destination, "rules/a.md");
        assert!(resolution.dropped.is_empty());
    }

    #[test]
    fn test_ask_without_port_degrades_to_skip() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_with("pack-p", "rules/a.md");
        let targets = vec![target("rules/a.md", Some("rules/**"))];

        let resolution = resolve_targets(
            "pack-q",
            &targets,
            &ledger,
            temp.path(),
            ConflictStrategy::Ask,
            None,
        )
        .unwrap();

        assert!(resolution.writes.is_empty());
        assert_eq!(resolution.dropped.len(), 1);
    }

    #[test]
    fn test_ask_port_answer_applies() {
        struct AlwaysOverwrite;
        impl ConflictDecision for AlwaysOverwrite {
            fn decide(&self, _package: &str, _conflicts: &[String]) -> Result<ConflictStrategy> {
                Ok(ConflictStrategy::Overwrite)
            }
        }

        let temp = TempDir::new().unwrap();
        let ledger = ledger_with("pack-p", "rules/a.md");
        let targets = vec![target("rules/a.md", Some("rules/**"))];

        let resolution = resolve_targets(
            "pack-q",
            &targets,
            &ledger,
            temp.path(),
            ConflictStrategy::Ask,
            Some(&AlwaysOverwrite),
        )
        .unwrap();

        assert_eq!(resolution.writes[0].destination, "rules/a.md");
    }

    #[test]
    fn test_namespaced_destination_collision_relocates_owner() {
        let temp = TempDir::new().unwrap();
        // "other" canonically owns the path the namespaced write lands on
        let mut ledger = ledger_with("pack-p", "rules/a.md");
        ledger.record(
            "other",
            LedgerEntry {
                path: "test".to_string(),
                version: None,
                hash: None,
                files: BTreeMap::from([(
                    "rules/pack-q/a.md".to_string(),
                    vec!["rules/pack-q/a.md".to_string()],
                )]),
            },
        );

        let targets = vec![target("rules/a.md", Some("rules/**"))];
        let resolution = resolve_targets(
            "pack-q",
            &targets,
            &ledger,
            temp.path(),
            ConflictStrategy::Namespace,
            None,
        )
        .unwrap();

        assert_eq!(resolution.relocations.len(), 1);
        let relocation = &resolution.relocations[0];
        assert_eq!(relocation.owner, "other");
        assert_eq!(relocation.from, "rules/pack-q/a.md");
        assert_eq!(relocation.to, "rules/other/pack-q/a.md");
        // Both competing claims end up namespaced
        assert_eq!(resolution.writes[0].destination, "rules/pack-q/a.md");
    }
}
