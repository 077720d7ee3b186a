//! Version constraint solving for registry packages
//!
//! For every registry-sourced package name in the graph the solver
//! collects the distinct requested ranges across all declarations and
//! resolves one version, or reports a conflict. Intersection is computed
//! over the registry's actual version list (not pairwise range
//! compatibility), so `^1.0.0` + `^1.2.0` resolves to the highest `1.2.x`
//! the registry carries.

use std::collections::BTreeMap;
use std::path::PathBuf;

use semver::{Version, VersionReq};
use serde::Serialize;

use crate::error::{AgentpackError, Result};
use crate::graph::DependencyGraph;
use crate::source::{PackageSource, name};

/// Collaborator port: the registry index.
///
/// Listing and content lookup are delegated here; the core performs no
/// registry I/O of its own.
pub trait RegistryIndex: Send + Sync {
    /// Available versions for a package, any order
    fn versions(&self, package: &str) -> Result<Vec<Version>>;

    /// Content root for one exact version of a package
    fn content_root(&self, package: &str, version: &Version) -> Result<PathBuf>;
}

/// Injected port for interactive version-conflict resolution.
///
/// The solver runs correctly with this port absent, reporting the
/// conflict instead of prompting.
pub trait VersionChoice {
    /// Pick one version out of `candidates` for `package`, or `None` to
    /// decline (the conflict then stands).
    fn choose(
        &self,
        package: &str,
        candidates: &[Version],
        reason: &str,
    ) -> Result<Option<Version>>;
}

/// An unresolved disagreement between requesters of one package
#[derive(Debug, Clone, Serialize)]
pub struct VersionConflict {
    pub package: String,
    pub ranges: Vec<String>,
    pub requested_by: Vec<String>,
}

/// Outcome of the solving phase
#[derive(Debug, Clone, Default, Serialize)]
pub struct VersionSolution {
    /// package name -> chosen version
    pub resolved: BTreeMap<String, Version>,
    pub conflicts: Vec<VersionConflict>,
}

impl VersionSolution {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Ranges and requesters gathered for one registry package
struct Request {
    ranges: Vec<(String, VersionReq)>,
    requested_by: Vec<String>,
}

/// Solver for version constraints across the graph
pub struct VersionSolver<'a> {
    registry: Option<&'a dyn RegistryIndex>,
    chooser: Option<&'a dyn VersionChoice>,
    force: bool,
}

impl<'a> VersionSolver<'a> {
    pub fn new(
        registry: Option<&'a dyn RegistryIndex>,
        chooser: Option<&'a dyn VersionChoice>,
        force: bool,
    ) -> Self {
        Self {
            registry,
            chooser,
            force,
        }
    }

    /// Solve every registry package in the graph and write resolved
    /// versions back onto the corresponding nodes.
    pub fn solve(&self, graph: &mut DependencyGraph) -> Result<VersionSolution> {
        let requests = Self::collect_requests(graph)?;
        let mut solution = VersionSolution::default();

        let Some(registry) = self.registry else {
            if !requests.is_empty() {
                graph.warnings.push(
                    "No registry index available; registry packages deferred".to_string(),
                );
            }
            return Ok(solution);
        };

        for (package, request) in requests {
            match self.solve_one(registry, &package, &request)? {
                Ok(version) => {
                    solution.resolved.insert(package, version);
                }
                Err(conflict) => solution.conflicts.push(conflict),
            }
        }

        Self::write_back(graph, &solution);
        Ok(solution)
    }

    /// Gather distinct requested ranges per registry package base name
    fn collect_requests(graph: &DependencyGraph) -> Result<BTreeMap<String, Request>> {
        let mut requests: BTreeMap<String, Request> = BTreeMap::new();

        for node in graph.nodes() {
            let PackageSource::Registry { name: pkg_name, .. } = &node.source else {
                continue;
            };
            let base = name::base_name(pkg_name).to_string();
            let request = requests.entry(base).or_insert_with(|| Request {
                ranges: Vec::new(),
                requested_by: Vec::new(),
            });

            for decl in &node.declarations {
                if !request.requested_by.contains(&decl.requested_by) {
                    request.requested_by.push(decl.requested_by.clone());
                }
                let Some(range) = &decl.requested_range else {
                    continue;
                };
                if request.ranges.iter().any(|(raw, _)| raw == range) {
                    continue;
                }
                let req = VersionReq::parse(range).map_err(|e| {
                    AgentpackError::VersionRangeInvalid {
                        package: pkg_name.clone(),
                        range: range.clone(),
                        reason: e.to_string(),
                    }
                })?;
                request.ranges.push((range.clone(), req));
            }
        }

        Ok(requests)
    }

    /// Resolve one package; the inner `Err` is a conflict entry, not a
    /// run-level failure.
    fn solve_one(
        &self,
        registry: &dyn RegistryIndex,
        package: &str,
        request: &Request,
    ) -> Result<std::result::Result<Version, VersionConflict>> {
        let mut available = registry.versions(package)?;
        available.sort();

        let conflict = || VersionConflict {
            package: package.to_string(),
            ranges: request.ranges.iter().map(|(raw, _)| raw.clone()).collect(),
            requested_by: request.requested_by.clone(),
        };

        // Nothing requested a range: take the latest available
        if request.ranges.is_empty() {
            return Ok(match available.last() {
                Some(v) => Ok(v.clone()),
                None => Err(conflict()),
            });
        }

        // A single version satisfying every range wins outright
        let intersection: Vec<&Version> = available
            .iter()
            .filter(|v| request.ranges.iter().all(|(_, req)| req.matches(v)))
            .collect();
        if let Some(best) = intersection.last() {
            return Ok(Ok((*best).clone()));
        }

        // Disjoint ranges: candidates satisfying the union of ranges
        let union: Vec<Version> = available
            .iter()
            .filter(|v| request.ranges.iter().any(|(_, req)| req.matches(v)))
            .cloned()
            .collect();

        if union.is_empty() {
            return Ok(Err(conflict()));
        }

        if let Some(chooser) = self.chooser {
            let ranges: Vec<String> =
                request.ranges.iter().map(|(raw, _)| raw.clone()).collect();
            let reason = format!(
                "Conflicting version ranges for '{package}': {}",
                ranges.join(", ")
            );
            // One prompt per conflicting package; first approved answer wins
            if let Some(version) = chooser.choose(package, &union, &reason)? {
                return Ok(Ok(version));
            }
            return Ok(Err(conflict()));
        }

        if self.force {
            // Deterministic tie-break: highest version satisfying the
            // union of the conflicting ranges.
            return Ok(match union.last() {
                Some(v) => Ok(v.clone()),
                None => Err(conflict()),
            });
        }

        Ok(Err(conflict()))
    }

    /// Write resolved versions back onto the graph nodes before loading
    fn write_back(graph: &mut DependencyGraph, solution: &VersionSolution) {
        let ids: Vec<_> = graph.node_ids().cloned().collect();
        for id in ids {
            let Some(node) = graph.get_mut(&id) else {
                continue;
            };
            let PackageSource::Registry { name: pkg_name, .. } = &node.source else {
                continue;
            };
            if let Some(version) = solution.resolved.get(name::base_name(pkg_name)) {
                node.resolved_version = Some(version.clone());
            }
        }
    }
}
