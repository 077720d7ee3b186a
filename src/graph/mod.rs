//! Dependency graph construction
//!
//! The builder walks root declarations plus, recursively, each package's
//! own declared dependencies (via the [`ManifestSource`] collaborator),
//! producing a node graph keyed by source identity. Cycles are recorded,
//! never fatal: the walk keeps an explicit "currently visiting" chain and
//! an explicit work stack, so deep chains neither loop forever nor
//! overflow the call stack.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use semver::Version;

use crate::error::{AgentpackError, Result};
use crate::manifest::{DependencyDecl, ManifestSource};
use crate::options::ResolutionMode;
use crate::source::{PackageSource, git_url, name};

/// Unique key identifying one graph node: source key plus optional
/// resource sub-path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(source_key: &str, resource: Option<&str>) -> Self {
        match resource {
            Some(r) => NodeId(format!("{source_key}::{r}")),
            None => NodeId(source_key.to_string()),
        }
    }

    pub fn for_source(source: &PackageSource) -> Self {
        Self::new(&source.source_key(), source.resource_path())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a node within one resolution session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Discovered,
    Loading,
    Loaded,
    Installing,
    Installed,
    Failed,
}

/// One declaration that requested a node
#[derive(Debug, Clone)]
pub struct Declaration {
    /// Requested version range, when given
    pub requested_range: Option<String>,

    /// Name of the requesting package, or `<root>` for top-level input
    pub requested_by: String,

    /// Directory the declaration's relative paths resolved against
    pub manifest_base: PathBuf,
}

/// Content resolved for a node once its state reaches `Loaded`
#[derive(Debug, Clone)]
pub struct LoadedPackage {
    /// Resolved version, when the package is versioned
    pub version: Option<Version>,

    /// Directory holding the package's installable content
    pub content_root: PathBuf,
}

/// One node of the dependency graph
#[derive(Debug, Clone)]
pub struct ResolutionNode {
    pub id: NodeId,
    /// Declared package name
    pub name: String,
    pub source: PackageSource,
    /// Every distinct declaration that requested this node
    pub declarations: Vec<Declaration>,
    /// Back-references only; the graph owns all nodes
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    pub state: NodeState,
    /// 1 + max(parent depths); 0 for roots
    pub depth: usize,
    /// Written back by the version solver before loading
    pub resolved_version: Option<Version>,
    pub loaded: Option<LoadedPackage>,
    /// Failure detail when `state == Failed`
    pub failure: Option<String>,
}

impl ResolutionNode {
    fn new(id: NodeId, name: String, source: PackageSource) -> Self {
        Self {
            id,
            name,
            source,
            declarations: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
            state: NodeState::Discovered,
            depth: 0,
            resolved_version: None,
            loaded: None,
            failure: None,
        }
    }
}

/// The dependency graph built for one resolution run
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<NodeId, ResolutionNode>,
    /// Discovery order, for deterministic iteration
    order: Vec<NodeId>,
    /// Top-level nodes (no declaring parent), in input order
    pub roots: Vec<NodeId>,
    /// Detected cycles: each the ancestor chain from the repeated
    /// identity back to itself
    pub cycles: Vec<Vec<NodeId>>,
    pub warnings: Vec<String>,
}

impl DependencyGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.values().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&ResolutionNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut ResolutionNode> {
        self.nodes.get_mut(id)
    }

    /// Node ids in discovery order
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.order.iter()
    }

    /// Nodes in discovery order
    pub fn nodes(&self) -> impl Iterator<Item = &ResolutionNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    fn insert(&mut self, node: ResolutionNode) {
        self.order.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
    }

    /// Installation order: dependencies before their dependents, stable
    /// across runs. Iterative post-order from the roots; edges closing a
    /// cycle are skipped rather than followed.
    pub fn install_order(&self) -> Vec<NodeId> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut on_stack: HashSet<NodeId> = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        let mut entry_points: Vec<NodeId> = self.roots.clone();
        entry_points.extend(self.order.iter().cloned());

        for entry in entry_points {
            if visited.contains(&entry) {
                continue;
            }

            let mut stack: Vec<(NodeId, usize)> = vec![(entry.clone(), 0)];
            on_stack.insert(entry);

            while let Some((id, child_idx)) = stack.last_mut() {
                let current = id.clone();
                let next_idx = *child_idx;
                *child_idx += 1;

                let child = self
                    .nodes
                    .get(&current)
                    .and_then(|n| n.children.get(next_idx))
                    .cloned();

                match child {
                    Some(child) => {
                        if !visited.contains(&child) && !on_stack.contains(&child) {
                            on_stack.insert(child.clone());
                            stack.push((child, 0));
                        }
                    }
                    None => {
                        stack.pop();
                        on_stack.remove(&current);
                        visited.insert(current.clone());
                        order.push(current);
                    }
                }
            }
        }

        order
    }

    /// Recompute `depth` for every node as 1 + max(parent depths), with
    /// edges that closed a cycle excluded so the propagation terminates.
    fn recompute_depths(&mut self) {
        let back_edges: HashSet<(NodeId, NodeId)> = self
            .cycles
            .iter()
            .filter_map(|chain| {
                let n = chain.len();
                (n >= 2).then(|| (chain[n - 2].clone(), chain[n - 1].clone()))
            })
            .collect();

        let mut in_deg: HashMap<NodeId, usize> = HashMap::new();
        let mut edges: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for node in self.nodes.values() {
            in_deg.entry(node.id.clone()).or_insert(0);
            for child in &node.children {
                if back_edges.contains(&(node.id.clone(), child.clone())) {
                    continue;
                }
                edges
                    .entry(node.id.clone())
                    .or_default()
                    .push(child.clone());
                *in_deg.entry(child.clone()).or_insert(0) += 1;
            }
        }

        let mut queue: Vec<NodeId> = self
            .order
            .iter()
            .filter(|id| in_deg.get(*id).copied().unwrap_or(0) == 0)
            .cloned()
            .collect();

        for id in &queue {
            if let Some(node) = self.nodes.get_mut(id) {
                node.depth = 0;
            }
        }

        let mut head = 0;
        while head < queue.len() {
            let id = queue[head].clone();
            head += 1;
            let depth = self.nodes.get(&id).map(|n| n.depth).unwrap_or(0);

            let children = edges.get(&id).cloned().unwrap_or_default();
            for child in children {
                if let Some(node) = self.nodes.get_mut(&child) {
                    node.depth = node.depth.max(depth + 1);
                }
                if let Some(deg) = in_deg.get_mut(&child) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push(child);
                    }
                }
            }
        }
    }
}

enum WalkItem {
    Enter {
        decl: DependencyDecl,
        parent: Option<NodeId>,
        base: PathBuf,
    },
    Exit,
}

/// Builds a [`DependencyGraph`] from root declarations
pub struct GraphBuilder<'a> {
    manifests: &'a dyn ManifestSource,
    mode: ResolutionMode,
    workspace_root: PathBuf,
    graph: DependencyGraph,
    /// Ancestor chain of the walk, for cycle detection
    visiting: Vec<NodeId>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        manifests: &'a dyn ManifestSource,
        mode: ResolutionMode,
    ) -> Self {
        Self {
            manifests,
            mode,
            workspace_root: workspace_root.into(),
            graph: DependencyGraph::default(),
            visiting: Vec::new(),
        }
    }

    /// Walk the declarations and build the graph.
    ///
    /// Every root declaration is validated before any graph state exists;
    /// manifest-supplied declarations are validated as they are read.
    pub fn build(mut self, roots: &[DependencyDecl]) -> Result<DependencyGraph> {
        for decl in roots {
            decl.validate()?;
        }

        let workspace_root = self.workspace_root.clone();
        let mut stack: Vec<WalkItem> = roots
            .iter()
            .rev()
            .map(|decl| WalkItem::Enter {
                decl: decl.clone(),
                parent: None,
                base: workspace_root.clone(),
            })
            .collect();

        while let Some(item) = stack.pop() {
            match item {
                WalkItem::Exit => {
                    self.visiting.pop();
                }
                WalkItem::Enter { decl, parent, base } => {
                    self.enter(&decl, parent, &base, &mut stack)?;
                }
            }
        }

        for cycle in &self.graph.cycles {
            let chain: Vec<&str> = cycle.iter().map(NodeId::as_str).collect();
            self.graph
                .warnings
                .push(format!("Circular dependency detected: {}", chain.join(" -> ")));
        }

        self.graph.recompute_depths();
        Ok(self.graph)
    }

    fn enter(
        &mut self,
        decl: &DependencyDecl,
        parent: Option<NodeId>,
        base: &Path,
        stack: &mut Vec<WalkItem>,
    ) -> Result<()> {
        decl.validate()?;

        let source = self.source_for(decl, base)?;
        let id = NodeId::for_source(&source);

        let requested_range = decl.version.clone().or_else(|| match &source {
            PackageSource::Registry { version, .. } => version.clone(),
            _ => None,
        });
        let requested_by = parent
            .as_ref()
            .and_then(|p| self.graph.get(p))
            .map(|n| n.name.clone())
            .unwrap_or_else(|| "<root>".to_string());

        let already_known = self.graph.contains(&id);
        if !already_known {
            let node_name = match &source {
                PackageSource::Registry { name, .. } => name.clone(),
                _ => decl.name.clone(),
            };
            self.graph
                .insert(ResolutionNode::new(id.clone(), node_name, source.clone()));
        }

        if let Some(node) = self.graph.get_mut(&id) {
            node.declarations.push(Declaration {
                requested_range,
                requested_by,
                manifest_base: base.to_path_buf(),
            });
        }

        match &parent {
            Some(parent_id) => {
                if let Some(node) = self.graph.get_mut(&id) {
                    if !node.parents.contains(parent_id) {
                        node.parents.push(parent_id.clone());
                    }
                }
                if let Some(parent_node) = self.graph.get_mut(parent_id) {
                    if !parent_node.children.contains(&id) {
                        parent_node.children.push(id.clone());
                    }
                }
            }
            None => {
                if !self.graph.roots.contains(&id) {
                    self.graph.roots.push(id.clone());
                }
            }
        }

        // A repeat visit whose ancestor chain already contains this
        // identity closes a cycle; record it and do not recurse further
        // along this edge.
        if let Some(start) = self.visiting.iter().position(|v| v == &id) {
            let mut chain: Vec<NodeId> = self.visiting[start..].to_vec();
            chain.push(id);
            self.graph.cycles.push(chain);
            return Ok(());
        }

        // Each distinct identity is visited at most once per walk pass
        if already_known {
            return Ok(());
        }

        let Some(child_decls) = self.manifests.declarations_for(&source)? else {
            return Ok(());
        };

        let child_base = self.child_base(&source, decl);
        self.visiting.push(id.clone());
        stack.push(WalkItem::Exit);
        for child in child_decls.into_iter().rev() {
            stack.push(WalkItem::Enter {
                decl: child,
                parent: Some(id.clone()),
                base: child_base.clone(),
            });
        }

        Ok(())
    }

    /// Directory that a child package's relative `path` dependencies
    /// resolve against: the package's own content root plus its declared
    /// `base` sub-path.
    fn child_base(&self, source: &PackageSource, decl: &DependencyDecl) -> PathBuf {
        let root = match source {
            PackageSource::Path { path } => path.clone(),
            PackageSource::Git {
                content_root,
                subpath,
                ..
            } => match (content_root, subpath) {
                (Some(root), Some(sub)) => root.join(sub),
                (Some(root), None) => root.clone(),
                (None, _) => self.workspace_root.clone(),
            },
            PackageSource::Registry { .. } => self.workspace_root.clone(),
        };

        match &decl.base {
            Some(base) => root.join(base),
            None => root,
        }
    }

    /// Map a declaration to its package source, honoring the run's
    /// resolution mode when a declaration names both a registry package
    /// and a git repository.
    fn source_for(&self, decl: &DependencyDecl, base: &Path) -> Result<PackageSource> {
        if let Some(path) = &decl.path {
            let p = PathBuf::from(path);
            let abs = if p.is_absolute() { p } else { base.join(p) };
            return Ok(PackageSource::Path { path: abs });
        }

        if let Some(url) = &decl.git {
            let prefers_registry = self.mode != ResolutionMode::RemotePrimary
                && decl.version.is_some()
                && !decl.name.starts_with("gh@");
            if !prefers_registry {
                return Ok(PackageSource::Git {
                    url: git_url::normalize(url)?,
                    git_ref: decl.git_ref.clone(),
                    subpath: name::split_scoped(&decl.name).1.map(str::to_string),
                    content_root: None,
                });
            }
        }

        match PackageSource::parse(&decl.name)? {
            PackageSource::Path { .. } => Err(AgentpackError::DeclarationInvalid {
                message: format!(
                    "Dependency '{}' looks like a path; declare it with 'path' instead",
                    decl.name
                ),
            }),
            source => Ok(source),
        }
    }
}
