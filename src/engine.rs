//! Top-level resolution engine
//!
//! Wires the pipeline together: graph builder -> version solver ->
//! package loader -> planner/executor. Collaborator ports are injected
//! through the builder methods; every port has a working default or a
//! graceful degradation when absent.

use std::path::PathBuf;

use crate::conflict::ConflictDecision;
use crate::error::Result;
use crate::graph::{GraphBuilder, NodeState};
use crate::install::targets::{DirectTargetMapper, TargetMapper};
use crate::install::{ExecutionResult, InstallExecutor, InstallPlanner, PackageResult, Summary};
use crate::ledger::OwnershipLedger;
use crate::loader::{LoadCache, PackageLoader};
use crate::manifest::{DependencyDecl, FileManifestSource, ManifestSource};
use crate::options::RunOptions;
use crate::solver::{RegistryIndex, VersionChoice, VersionSolver};
use crate::subsume::{PackageRemover, WorkspaceRemover};
use crate::ui::{Reporter, SilentReporter};

/// The dependency resolution and installation engine for one workspace
pub struct Engine {
    workspace_root: PathBuf,
    registry: Option<Box<dyn RegistryIndex>>,
    manifests: Box<dyn ManifestSource>,
    mapper: Box<dyn TargetMapper>,
    remover: Box<dyn PackageRemover>,
    version_choice: Option<Box<dyn VersionChoice>>,
    conflict_decision: Option<Box<dyn ConflictDecision>>,
    reporter: Box<dyn Reporter>,
    /// Session-scoped load cache; lives as long as the engine
    cache: LoadCache,
    show_progress: bool,
}

impl Engine {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            manifests: Box::new(FileManifestSource::new(&workspace_root)),
            mapper: Box::new(DirectTargetMapper::new()),
            remover: Box::new(WorkspaceRemover),
            registry: None,
            version_choice: None,
            conflict_decision: None,
            reporter: Box::new(SilentReporter),
            cache: LoadCache::new(),
            show_progress: false,
            workspace_root,
        }
    }

    pub fn with_registry(mut self, registry: Box<dyn RegistryIndex>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_manifest_source(mut self, manifests: Box<dyn ManifestSource>) -> Self {
        self.manifests = manifests;
        self
    }

    pub fn with_target_mapper(mut self, mapper: Box<dyn TargetMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn with_remover(mut self, remover: Box<dyn PackageRemover>) -> Self {
        self.remover = remover;
        self
    }

    pub fn with_version_choice(mut self, port: Box<dyn VersionChoice>) -> Self {
        self.version_choice = Some(port);
        self
    }

    pub fn with_conflict_decision(mut self, port: Box<dyn ConflictDecision>) -> Self {
        self.conflict_decision = Some(port);
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Resolve and install the given root declarations.
    ///
    /// Node-level failures are captured into the per-node result list;
    /// whole-run failures (unreadable ledger, invalid declarations,
    /// unreadable manifests) return a structured failure with no partial
    /// graph.
    pub fn run(&mut self, roots: &[DependencyDecl], options: &RunOptions) -> ExecutionResult {
        match self.try_run(roots, options) {
            Ok(result) => result,
            Err(err) => ExecutionResult::failure(err),
        }
    }

    fn try_run(&mut self, roots: &[DependencyDecl], options: &RunOptions) -> Result<ExecutionResult> {
        let mut ledger = OwnershipLedger::load(&self.workspace_root)?;

        let builder = GraphBuilder::new(
            &self.workspace_root,
            self.manifests.as_ref(),
            options.resolution_mode,
        );
        let mut graph = builder.build(roots)?;

        for warning in &graph.warnings {
            self.reporter.warn(warning);
        }

        let solver = VersionSolver::new(
            self.registry.as_deref(),
            self.version_choice.as_deref(),
            options.force,
        );
        let solution = solver.solve(&mut graph)?;

        // Unresolved version conflicts block installation of the whole run
        if solution.has_conflicts() {
            let packages: Vec<String> = solution
                .conflicts
                .iter()
                .map(|c| c.package.clone())
                .collect();
            let warnings = graph.warnings.clone();
            return Ok(ExecutionResult {
                success: false,
                results: Vec::new(),
                summary: Summary {
                    total: graph.node_count(),
                    ..Summary::default()
                },
                graph,
                warnings,
                version_solution: Some(solution),
                error: Some(format!(
                    "version conflicts block installation: {}",
                    packages.join(", ")
                )),
            });
        }

        let loader = PackageLoader::new(self.registry.as_deref(), options.resolution_mode)
            .with_progress(self.show_progress);
        loader.load_all(&mut graph, &mut self.cache)?;

        let plan = InstallPlanner::plan(&graph, &ledger);
        let executor = InstallExecutor::new(
            &self.workspace_root,
            options,
            self.mapper.as_ref(),
            self.remover.as_ref(),
            self.conflict_decision.as_deref(),
            self.reporter.as_ref(),
        );
        let outcome = executor.execute(&mut graph, &plan, &mut ledger);

        // Load failures never made it into the plan; surface them as
        // per-node results alongside the executor's.
        let mut results: Vec<PackageResult> = graph
            .nodes()
            .filter(|node| node.state == NodeState::Failed)
            .filter(|node| !outcome.results.iter().any(|r| r.node_id == node.id))
            .map(|node| PackageResult {
                node_id: node.id.clone(),
                package: node.name.clone(),
                success: false,
                error: node.failure.clone(),
                installed_files: Vec::new(),
                unchanged_files: Vec::new(),
                namespaced: false,
            })
            .collect();
        results.extend(outcome.results);

        let installed = results.iter().filter(|r| r.success).count();
        let failed = results.iter().filter(|r| !r.success).count();
        let skipped = plan.skipped.len() + outcome.skipped.len();
        let warnings = graph.warnings.clone();

        Ok(ExecutionResult {
            success: failed == 0,
            results,
            summary: Summary {
                total: graph.node_count(),
                installed,
                failed,
                skipped,
            },
            graph,
            warnings,
            version_solution: Some(solution),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_whole_run_failure_has_no_partial_graph() {
        let temp = TempDir::new().unwrap();
        let mut engine = Engine::new(temp.path());

        let mut bad = DependencyDecl::registry("toolkit", None);
        bad.base = Some("/absolute".to_string());

        let result = engine.run(&[bad], &RunOptions::default());
        assert!(!result.success);
        assert!(result.error.is_some());
        assert_eq!(result.graph.node_count(), 0);
        assert_eq!(result.summary.total, 0);
    }

    #[test]
    fn test_empty_roots_run_succeeds() {
        let temp = TempDir::new().unwrap();
        let mut engine = Engine::new(temp.path());

        let result = engine.run(&[], &RunOptions::default());
        assert!(result.success);
        assert_eq!(result.summary.total, 0);
    }
}
