//! Package content loading
//!
//! Loads content for graph nodes grouped by graph depth: buckets are
//! processed in ascending depth order and loads within one bucket run
//! concurrently, because no node depends on a sibling's load result.
//! Loads never run across buckets, and never during the install phase.
//!
//! A failed load marks its node `Failed` and is recorded, not rethrown;
//! only the planner's fail-fast policy decides whether the run aborts.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::error::{AgentpackError, Result};
use crate::graph::{DependencyGraph, LoadedPackage, NodeId, NodeState};
use crate::manifest::Manifest;
use crate::options::ResolutionMode;
use crate::solver::RegistryIndex;
use crate::source::{PackageSource, SourceKind, name};

/// Marker files identifying a marketplace aggregate rather than
/// installable content
const MARKETPLACE_MARKERS: &[&str] = &[".claude-plugin/marketplace.json", "marketplace.json"];

/// Session-scoped load cache keyed by node identity.
///
/// Owned by one resolution session and passed by reference into the
/// loader; never a process-wide singleton, so repeated runs stay hermetic.
#[derive(Debug, Default)]
pub struct LoadCache {
    entries: HashMap<NodeId, LoadedPackage>,
}

impl LoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &NodeId) -> Option<&LoadedPackage> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: NodeId, loaded: LoadedPackage) {
        self.entries.insert(id, loaded);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of loading one node
enum LoadOutcome {
    /// Installable content resolved
    Loaded(LoadedPackage),
    /// Nothing to install here; the node stays `Discovered` and the
    /// planner skips it
    NotInstallable(String),
}

/// Everything a load job needs, detached from the graph so jobs can run
/// concurrently within a bucket.
struct LoadRequest {
    id: NodeId,
    pkg_name: String,
    source: PackageSource,
    resolved_version: Option<semver::Version>,
}

/// Loads package content for every node of a graph
pub struct PackageLoader<'a> {
    registry: Option<&'a dyn RegistryIndex>,
    mode: ResolutionMode,
    show_progress: bool,
}

impl<'a> PackageLoader<'a> {
    pub fn new(registry: Option<&'a dyn RegistryIndex>, mode: ResolutionMode) -> Self {
        Self {
            registry,
            mode,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Load every `Discovered` node, ascending by graph depth.
    pub fn load_all(&self, graph: &mut DependencyGraph, cache: &mut LoadCache) -> Result<()> {
        let mut buckets: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for node in graph.nodes() {
            if node.state == NodeState::Discovered {
                buckets.entry(node.depth).or_default().push(node.id.clone());
            }
        }

        let total: usize = buckets.values().map(Vec::len).sum();
        let pb = if self.show_progress && total > 0 {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner} Loading packages {pos}/{len}")
                    .unwrap(),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        for ids in buckets.into_values() {
            let mut requests: Vec<LoadRequest> = Vec::new();

            for id in ids {
                if let Some(cached) = cache.get(&id) {
                    let cached = cached.clone();
                    if let Some(node) = graph.get_mut(&id) {
                        node.loaded = Some(cached);
                        node.state = NodeState::Loaded;
                    }
                    pb.inc(1);
                    continue;
                }

                let Some(node) = graph.get_mut(&id) else {
                    continue;
                };
                node.state = NodeState::Loading;
                requests.push(LoadRequest {
                    id: id.clone(),
                    pkg_name: node.name.clone(),
                    source: node.source.clone(),
                    resolved_version: node.resolved_version.clone(),
                });
            }

            // One depth bucket loads concurrently; buckets never overlap
            let results: Vec<(NodeId, Result<LoadOutcome>)> = requests
                .par_iter()
                .map(|request| (request.id.clone(), self.load_one(request)))
                .collect();

            for (id, result) in results {
                pb.inc(1);
                let Some(node) = graph.get_mut(&id) else {
                    continue;
                };
                match result {
                    Ok(LoadOutcome::Loaded(loaded)) => {
                        cache.insert(id, loaded.clone());
                        node.loaded = Some(loaded);
                        node.state = NodeState::Loaded;
                    }
                    Ok(LoadOutcome::NotInstallable(reason)) => {
                        node.state = NodeState::Discovered;
                        graph
                            .warnings
                            .push(format!("Skipping '{}': {}", id, reason));
                    }
                    Err(err) => {
                        node.failure = Some(err.to_string());
                        node.state = NodeState::Failed;
                    }
                }
            }
        }

        pb.finish_and_clear();
        Ok(())
    }

    /// Dispatch one load by source kind
    fn load_one(&self, request: &LoadRequest) -> Result<LoadOutcome> {
        match request.source.kind() {
            SourceKind::Path => self.load_path(request),
            SourceKind::Git => self.load_git(request),
            SourceKind::Registry => self.load_registry(request),
        }
    }

    fn load_path(&self, request: &LoadRequest) -> Result<LoadOutcome> {
        let PackageSource::Path { path } = &request.source else {
            return Err(AgentpackError::SourceLoadFailed {
                name: request.pkg_name.clone(),
                reason: "path loader invoked for non-path source".to_string(),
            });
        };

        if !path.is_dir() {
            return Err(AgentpackError::SourceLoadFailed {
                name: request.pkg_name.clone(),
                reason: format!("directory '{}' does not exist", path.display()),
            });
        }

        if is_marketplace_aggregate(path) {
            return Ok(LoadOutcome::NotInstallable(
                "marketplace aggregate, not installable content".to_string(),
            ));
        }

        Ok(LoadOutcome::Loaded(LoadedPackage {
            version: manifest_version(path),
            content_root: path.clone(),
        }))
    }

    fn load_git(&self, request: &LoadRequest) -> Result<LoadOutcome> {
        let PackageSource::Git {
            content_root, url, ..
        } = &request.source
        else {
            return Err(AgentpackError::SourceLoadFailed {
                name: request.pkg_name.clone(),
                reason: "git loader invoked for non-git source".to_string(),
            });
        };

        let Some(checkout) = content_root else {
            if self.mode == ResolutionMode::LocalOnly {
                return Ok(LoadOutcome::NotInstallable(
                    "local-only resolution mode; no fetched checkout".to_string(),
                ));
            }
            // The fetcher collaborator never ran for this source
            return Err(AgentpackError::SourceLoadFailed {
                name: request.pkg_name.clone(),
                reason: format!("no fetched checkout available for '{url}'"),
            });
        };

        if !checkout.is_dir() {
            return Err(AgentpackError::SourceLoadFailed {
                name: request.pkg_name.clone(),
                reason: format!("checkout '{}' does not exist", checkout.display()),
            });
        }

        // Resource scoping stays a mapper concern so registry-relative
        // paths survive; the load resolves the package root only.
        if let Some(resource) = request.source.resource_path() {
            let scoped = checkout.join(resource);
            if !scoped.exists() {
                return Err(AgentpackError::SourceLoadFailed {
                    name: request.pkg_name.clone(),
                    reason: format!("resource '{resource}' not found in checkout"),
                });
            }
        }

        if is_marketplace_aggregate(checkout) {
            return Ok(LoadOutcome::NotInstallable(
                "marketplace aggregate, not installable content".to_string(),
            ));
        }

        Ok(LoadOutcome::Loaded(LoadedPackage {
            version: manifest_version(checkout),
            content_root: checkout.clone(),
        }))
    }

    fn load_registry(&self, request: &LoadRequest) -> Result<LoadOutcome> {
        let PackageSource::Registry { name: pkg_name, .. } = &request.source else {
            return Err(AgentpackError::SourceLoadFailed {
                name: request.pkg_name.clone(),
                reason: "registry loader invoked for non-registry source".to_string(),
            });
        };

        let Some(registry) = self.registry else {
            return Ok(LoadOutcome::NotInstallable(
                "registry packages are deferred; no registry index".to_string(),
            ));
        };

        let Some(version) = &request.resolved_version else {
            return Ok(LoadOutcome::NotInstallable(
                "no resolved version".to_string(),
            ));
        };

        let base = name::base_name(pkg_name);
        let root = registry.content_root(base, version)?;

        if !root.is_dir() {
            return Err(AgentpackError::SourceLoadFailed {
                name: request.pkg_name.clone(),
                reason: format!("registry content '{}' does not exist", root.display()),
            });
        }

        if let Some(resource) = name::split_scoped(pkg_name).1 {
            if !root.join(resource).exists() {
                return Err(AgentpackError::SourceLoadFailed {
                    name: request.pkg_name.clone(),
                    reason: format!("resource '{resource}' not found in package"),
                });
            }
        }

        Ok(LoadOutcome::Loaded(LoadedPackage {
            version: Some(version.clone()),
            content_root: root,
        }))
    }
}

/// Default location collaborating registry and git fetchers are expected
/// to store fetched content under.
pub fn default_store_dir() -> Option<std::path::PathBuf> {
    dirs::data_dir().map(|dir| dir.join("agentpack").join("store"))
}

fn is_marketplace_aggregate(root: &Path) -> bool {
    MARKETPLACE_MARKERS
        .iter()
        .any(|marker| root.join(marker).is_file())
}

fn manifest_version(root: &Path) -> Option<semver::Version> {
    Manifest::from_dir(root)
        .ok()
        .flatten()
        .and_then(|m| m.version)
        .and_then(|v| semver::Version::parse(&v).ok())
}
