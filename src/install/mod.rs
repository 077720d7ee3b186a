//! Installation planning and execution
//!
//! The planner turns a loaded graph into an ordered sequence of install
//! operations plus a skip list; the executor installs strictly in plan
//! order, because conflict resolution is a path-global, order-sensitive
//! operation over one workspace. Node failures are captured into per-node
//! results and never thrown past the executor boundary.

pub mod targets;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::conflict::{self, ConflictDecision, ConflictResolution};
use crate::error::{AgentpackError, Result};
use crate::graph::{DependencyGraph, LoadedPackage, NodeId, NodeState};
use crate::hash;
use crate::ledger::{LedgerEntry, OwnershipLedger};
use crate::options::RunOptions;
use crate::solver::VersionSolution;
use crate::source::PackageSource;
use crate::subsume::{self, PackageRemover, SubsumptionResult};
use crate::ui::Reporter;
use targets::TargetMapper;

/// Why a node was left out of the install plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing to install (marketplace container, deferred registry
    /// package, unreachable source in local-only mode)
    NotInstallable,
    /// The ledger already records this package at this version with
    /// identical content
    AlreadySatisfied,
    /// A broader same-source install covers this one
    AlreadyCovered { covering_package: String },
}

/// A node excluded from installation
#[derive(Debug, Clone)]
pub struct SkippedNode {
    pub node_id: NodeId,
    pub reason: SkipReason,
}

/// Ordered install operations plus the skip list
#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    pub operations: Vec<NodeId>,
    pub skipped: Vec<SkippedNode>,
}

/// Result of installing one node
#[derive(Debug, Clone)]
pub struct PackageResult {
    pub node_id: NodeId,
    pub package: String,
    pub success: bool,
    pub error: Option<String>,
    /// Workspace-relative paths written (or planned, under dry-run)
    pub installed_files: Vec<String>,
    /// Targets whose on-disk content already matched and were left alone
    pub unchanged_files: Vec<String>,
    /// Set when this package's batch was namespaced
    pub namespaced: bool,
}

/// Aggregated run counters
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub total: usize,
    pub installed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Structured outcome of a whole resolution run
#[derive(Debug)]
pub struct ExecutionResult {
    pub success: bool,
    pub results: Vec<PackageResult>,
    pub summary: Summary,
    pub graph: DependencyGraph,
    pub warnings: Vec<String>,
    pub version_solution: Option<VersionSolution>,
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Whole-run failure with no partial graph
    pub fn failure(error: AgentpackError) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            summary: Summary::default(),
            graph: DependencyGraph::default(),
            warnings: Vec::new(),
            version_solution: None,
            error: Some(error.to_string()),
        }
    }
}

/// Builds the install plan from a loaded graph
pub struct InstallPlanner;

impl InstallPlanner {
    /// One install operation per loadable, non-skipped node, in
    /// dependency order.
    pub fn plan(graph: &DependencyGraph, ledger: &OwnershipLedger) -> InstallPlan {
        let mut plan = InstallPlan::default();

        for id in graph.install_order() {
            let Some(node) = graph.get(&id) else {
                continue;
            };
            match node.state {
                NodeState::Loaded => {
                    if Self::already_satisfied(node.name.as_str(), node.loaded.as_ref(), ledger) {
                        plan.skipped.push(SkippedNode {
                            node_id: id,
                            reason: SkipReason::AlreadySatisfied,
                        });
                    } else {
                        plan.operations.push(id);
                    }
                }
                NodeState::Discovered => {
                    plan.skipped.push(SkippedNode {
                        node_id: id,
                        reason: SkipReason::NotInstallable,
                    });
                }
                // Failed loads surface through per-node results instead
                _ => {}
            }
        }

        plan
    }

    fn already_satisfied(
        package: &str,
        loaded: Option<&LoadedPackage>,
        ledger: &OwnershipLedger,
    ) -> bool {
        let Some(loaded) = loaded else {
            return false;
        };
        let Some(entry) = ledger.entry(package) else {
            return false;
        };

        let version_matches = match (&entry.version, &loaded.version) {
            (Some(recorded), Some(resolved)) => *recorded == resolved.to_string(),
            (None, None) => true,
            _ => false,
        };
        if !version_matches {
            return false;
        }

        match hash::hash_directory(&loaded.content_root) {
            Ok(current) => entry.hash.as_deref() == Some(current.as_str()),
            Err(_) => false,
        }
    }
}

/// Per-node data detached from the graph for one install operation
struct InstallJob {
    id: NodeId,
    package: String,
    source: PackageSource,
    loaded: LoadedPackage,
}

/// Outcome of the execution phase
pub struct ExecOutcome {
    pub results: Vec<PackageResult>,
    pub skipped: Vec<SkippedNode>,
}

/// Executes an install plan strictly in order
pub struct InstallExecutor<'a> {
    workspace_root: &'a Path,
    options: &'a RunOptions,
    mapper: &'a dyn TargetMapper,
    remover: &'a dyn PackageRemover,
    decision: Option<&'a dyn ConflictDecision>,
    reporter: &'a dyn Reporter,
}

impl<'a> InstallExecutor<'a> {
    pub fn new(
        workspace_root: &'a Path,
        options: &'a RunOptions,
        mapper: &'a dyn TargetMapper,
        remover: &'a dyn PackageRemover,
        decision: Option<&'a dyn ConflictDecision>,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            workspace_root,
            options,
            mapper,
            remover,
            decision,
            reporter,
        }
    }

    /// Install every planned node, sequentially. On `fail_fast` the first
    /// failure short-circuits the remaining plan; files already written
    /// stay in place (partial installation is a documented outcome).
    pub fn execute(
        &self,
        graph: &mut DependencyGraph,
        plan: &InstallPlan,
        ledger: &mut OwnershipLedger,
    ) -> ExecOutcome {
        let mut outcome = ExecOutcome {
            results: Vec::new(),
            skipped: Vec::new(),
        };
        let mut checked_sources: HashSet<String> = HashSet::new();

        for id in &plan.operations {
            let Some(node) = graph.get(id) else {
                continue;
            };
            let Some(loaded) = node.loaded.clone() else {
                continue;
            };
            let job = InstallJob {
                id: id.clone(),
                package: node.name.clone(),
                source: node.source.clone(),
                loaded,
            };

            // Subsumption is consulted once per source
            if checked_sources.insert(job.source.source_key()) {
                match subsume::check(&job.package, &job.source, ledger) {
                    SubsumptionResult::AlreadyCovered { covering_package } => {
                        self.reporter.detail(&format!(
                            "{} already covered by {}",
                            job.package, covering_package
                        ));
                        outcome.skipped.push(SkippedNode {
                            node_id: job.id,
                            reason: SkipReason::AlreadyCovered { covering_package },
                        });
                        continue;
                    }
                    SubsumptionResult::Upgrade { entries_to_remove } => {
                        if let Err(err) = self.apply_upgrade(&entries_to_remove, ledger) {
                            self.fail_node(graph, &job.id, &err);
                            outcome.results.push(PackageResult {
                                node_id: job.id,
                                package: job.package,
                                success: false,
                                error: Some(err.to_string()),
                                installed_files: Vec::new(),
                                unchanged_files: Vec::new(),
                                namespaced: false,
                            });
                            if self.options.fail_fast {
                                return outcome;
                            }
                            continue;
                        }
                    }
                    SubsumptionResult::None => {}
                }
            }

            if let Some(node) = graph.get_mut(&job.id) {
                node.state = NodeState::Installing;
            }

            match self.install_node(&job, ledger) {
                Ok(result) => {
                    if let Some(node) = graph.get_mut(&job.id) {
                        node.state = NodeState::Installed;
                    }
                    outcome.results.push(result);
                }
                Err(err) => {
                    self.fail_node(graph, &job.id, &err);
                    outcome.results.push(PackageResult {
                        node_id: job.id.clone(),
                        package: job.package.clone(),
                        success: false,
                        error: Some(err.to_string()),
                        installed_files: Vec::new(),
                        unchanged_files: Vec::new(),
                        namespaced: false,
                    });
                    if self.options.fail_fast {
                        return outcome;
                    }
                }
            }
        }

        outcome
    }

    fn fail_node(&self, graph: &mut DependencyGraph, id: &NodeId, err: &AgentpackError) {
        self.reporter.warn(&format!("{id}: {err}"));
        if let Some(node) = graph.get_mut(id) {
            node.state = NodeState::Failed;
            node.failure = Some(err.to_string());
        }
    }

    /// Remove subsumed entries so the canonical paths are free. Skipped
    /// entirely under dry-run.
    fn apply_upgrade(&self, entries: &[String], ledger: &mut OwnershipLedger) -> Result<()> {
        if self.options.dry_run {
            return Ok(());
        }
        for entry in entries {
            self.reporter
                .detail(&format!("removing subsumed entry {entry}"));
            self.remover.remove(entry, ledger, self.workspace_root)?;
        }
        ledger.save(self.workspace_root)
    }

    /// Install one node: plan targets, resolve conflicts, write files,
    /// persist the ledger entry.
    fn install_node(
        &self,
        job: &InstallJob,
        ledger: &mut OwnershipLedger,
    ) -> Result<PackageResult> {
        let planned = self
            .mapper
            .plan_targets(&job.loaded.content_root, job.source.resource_path())?;

        let resolution = conflict::resolve_targets(
            &job.package,
            &planned,
            ledger,
            self.workspace_root,
            self.options.conflict_strategy,
            self.decision,
        )?;

        let mut result = PackageResult {
            node_id: job.id.clone(),
            package: job.package.clone(),
            success: true,
            error: None,
            installed_files: Vec::new(),
            unchanged_files: Vec::new(),
            namespaced: resolution.was_namespaced,
        };

        if self.options.dry_run {
            result.installed_files = resolution
                .writes
                .iter()
                .map(|w| w.destination.clone())
                .collect();
            return Ok(result);
        }

        self.apply_relocations(&resolution, ledger)?;
        self.write_targets(&resolution, &mut result)?;

        let mut files: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for write in &resolution.writes {
            files
                .entry(write.target.relative.clone())
                .or_default()
                .push(write.destination.clone());
        }

        ledger.record(
            job.package.clone(),
            LedgerEntry {
                path: job.source.source_key(),
                version: job.loaded.version.as_ref().map(ToString::to_string),
                hash: hash::hash_directory(&job.loaded.content_root).ok(),
                files,
            },
        );
        ledger.save(self.workspace_root)?;

        Ok(result)
    }

    /// Move a previous owner's files off contested paths and rewrite its
    /// ledger entry accordingly.
    fn apply_relocations(
        &self,
        resolution: &ConflictResolution,
        ledger: &mut OwnershipLedger,
    ) -> Result<()> {
        for relocation in &resolution.relocations {
            let from = self.workspace_root.join(&relocation.from);
            let to = self.workspace_root.join(&relocation.to);

            if from.is_file() {
                if let Some(parent) = to.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AgentpackError::FileWriteFailed {
                            path: parent.display().to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                }
                std::fs::rename(&from, &to).map_err(|e| AgentpackError::FileWriteFailed {
                    path: to.display().to_string(),
                    reason: e.to_string(),
                })?;
            }

            if let Some(entry) = ledger.entry_mut(&relocation.owner) {
                for paths in entry.files.values_mut() {
                    for path in paths.iter_mut() {
                        if *path == relocation.from {
                            *path = relocation.to.clone();
                        }
                    }
                }
            }

            self.reporter.detail(&format!(
                "moved {} to {} ({})",
                relocation.from, relocation.to, relocation.owner
            ));
        }
        Ok(())
    }

    /// Copy resolved writes into the workspace. Targets whose content
    /// already matches are counted but not rewritten.
    fn write_targets(
        &self,
        resolution: &ConflictResolution,
        result: &mut PackageResult,
    ) -> Result<()> {
        for write in &resolution.writes {
            let destination = self.workspace_root.join(&write.destination);

            if hash::same_content(&write.target.source_path, &destination) {
                result.unchanged_files.push(write.destination.clone());
                continue;
            }

            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent).map_err(|e| AgentpackError::FileWriteFailed {
                    path: parent.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
            std::fs::copy(&write.target.source_path, &destination).map_err(|e| {
                AgentpackError::FileWriteFailed {
                    path: destination.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
            result.installed_files.push(write.destination.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::manifest::{DependencyDecl, FileManifestSource};
    use crate::options::ResolutionMode;
    use crate::subsume::WorkspaceRemover;
    use crate::ui::SilentReporter;
    use tempfile::TempDir;

    fn loaded_graph(workspace: &Path, decls: &[DependencyDecl]) -> DependencyGraph {
        let manifests = FileManifestSource::new(workspace);
        let mut graph = GraphBuilder::new(workspace, &manifests, ResolutionMode::Default)
            .build(decls)
            .expect("graph build");
        let mut cache = crate::loader::LoadCache::new();
        crate::loader::PackageLoader::new(None, ResolutionMode::Default)
            .load_all(&mut graph, &mut cache)
            .expect("load");
        graph
    }

    fn make_pack(workspace: &Path, dir: &str, files: &[(&str, &str)]) {
        for (rel, content) in files {
            let path = workspace.join(dir).join(rel);
            std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            std::fs::write(&path, content).expect("write");
        }
    }

    fn run_executor(
        workspace: &Path,
        graph: &mut DependencyGraph,
        ledger: &mut OwnershipLedger,
        options: &RunOptions,
    ) -> ExecOutcome {
        let plan = InstallPlanner::plan(graph, ledger);
        let mapper = targets::DirectTargetMapper::new();
        let executor = InstallExecutor::new(
            workspace,
            options,
            &mapper,
            &WorkspaceRemover,
            None,
            &SilentReporter,
        );
        executor.execute(graph, &plan, ledger)
    }

    #[test]
    fn test_plan_orders_dependencies_first() {
        let temp = TempDir::new().unwrap();
        make_pack(
            temp.path(),
            "app",
            &[("rules/app.md", "# app"), ("agentpack.yaml", "dependencies:\n  - name: lib\n    path: ../lib\n")],
        );
        make_pack(temp.path(), "lib", &[("rules/lib.md", "# lib")]);

        let graph = loaded_graph(temp.path(), &[DependencyDecl::local("app", "./app")]);
        let plan = InstallPlanner::plan(&graph, &OwnershipLedger::new());

        assert_eq!(plan.operations.len(), 2);
        let first = graph.get(&plan.operations[0]).unwrap();
        assert_eq!(first.name, "lib");
    }

    #[test]
    fn test_execute_installs_and_records_ledger() {
        let temp = TempDir::new().unwrap();
        make_pack(temp.path(), "pack", &[("rules/a.md", "# a")]);

        let mut graph = loaded_graph(temp.path(), &[DependencyDecl::local("pack", "./pack")]);
        let mut ledger = OwnershipLedger::new();
        let options = RunOptions::default();

        let outcome = run_executor(temp.path(), &mut graph, &mut ledger, &options);

        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].success);
        assert!(temp.path().join("rules/a.md").is_file());
        assert_eq!(ledger.owner_of("rules/a.md"), Some("pack"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp = TempDir::new().unwrap();
        make_pack(temp.path(), "pack", &[("rules/a.md", "# a")]);

        let mut graph = loaded_graph(temp.path(), &[DependencyDecl::local("pack", "./pack")]);
        let mut ledger = OwnershipLedger::new();
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };

        let outcome = run_executor(temp.path(), &mut graph, &mut ledger, &options);

        assert!(outcome.results[0].success);
        assert_eq!(outcome.results[0].installed_files, vec!["rules/a.md"]);
        assert!(!temp.path().join("rules/a.md").exists());
        assert!(ledger.packages.is_empty());
    }

    #[test]
    fn test_second_install_is_already_satisfied() {
        let temp = TempDir::new().unwrap();
        make_pack(temp.path(), "pack", &[("rules/a.md", "# a")]);
        let options = RunOptions::default();

        let mut graph = loaded_graph(temp.path(), &[DependencyDecl::local("pack", "./pack")]);
        let mut ledger = OwnershipLedger::new();
        run_executor(temp.path(), &mut graph, &mut ledger, &options);
        let entry_before = ledger.entry("pack").cloned();

        let mut graph2 = loaded_graph(temp.path(), &[DependencyDecl::local("pack", "./pack")]);
        let plan = InstallPlanner::plan(&graph2, &ledger);
        assert!(plan.operations.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].reason, SkipReason::AlreadySatisfied);

        let outcome = run_executor(temp.path(), &mut graph2, &mut ledger, &options);
        assert!(outcome.results.is_empty());
        assert_eq!(ledger.entry("pack").cloned(), entry_before);
    }

    #[test]
    fn test_fail_fast_short_circuits() {
        let temp = TempDir::new().unwrap();
        make_pack(temp.path(), "first", &[("rules/f.md", "# f")]);
        make_pack(temp.path(), "second", &[("rules/s.md", "# s")]);

        // A mapper that always fails forces a node failure
        struct FailingMapper;
        impl TargetMapper for FailingMapper {
            fn plan_targets(
                &self,
                _root: &Path,
                _resource: Option<&str>,
            ) -> Result<Vec<targets::PlannedTarget>> {
                Err(AgentpackError::IoError {
                    message: "boom".to_string(),
                })
            }
        }

        let mut graph = loaded_graph(
            temp.path(),
            &[
                DependencyDecl::local("first", "./first"),
                DependencyDecl::local("second", "./second"),
            ],
        );
        let mut ledger = OwnershipLedger::new();
        let options = RunOptions {
            fail_fast: true,
            ..RunOptions::default()
        };

        let plan = InstallPlanner::plan(&graph, &ledger);
        let mapper = FailingMapper;
        let executor = InstallExecutor::new(
            temp.path(),
            &options,
            &mapper,
            &WorkspaceRemover,
            None,
            &SilentReporter,
        );
        let outcome = executor.execute(&mut graph, &plan, &mut ledger);

        assert_eq!(outcome.results.len(), 1);
        assert!(!outcome.results[0].success);
    }
}
