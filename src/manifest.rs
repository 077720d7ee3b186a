//! Dependency declarations and package manifests
//!
//! A package manifest (`agentpack.yaml`) declares the dependencies of a
//! package. The graph builder consumes declarations either from root input
//! or through the [`ManifestSource`] collaborator, which resolves a
//! package's own declared dependencies during the walk.

use std::path::{Path, PathBuf};

use semver::VersionReq;
use serde::{Deserialize, Serialize};

use crate::error::{AgentpackError, Result};
use crate::source::PackageSource;

/// Manifest file name read by the default manifest source
pub const MANIFEST_FILE: &str = "agentpack.yaml";

/// A dependency declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDecl {
    /// Declared package name
    pub name: String,

    /// Requested version range (registry packages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Local path (for packages in the same repository)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Git repository URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<String>,

    /// Git ref (branch, tag, or SHA)
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,

    /// Sub-path under the declaring package that relative `path`
    /// dependencies resolve against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

impl DependencyDecl {
    /// Create a registry declaration
    pub fn registry(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
            path: None,
            git: None,
            git_ref: None,
            base: None,
        }
    }

    /// Create a local path declaration
    pub fn local(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            path: Some(path.into()),
            git: None,
            git_ref: None,
            base: None,
        }
    }

    /// Create a git declaration
    pub fn git(name: impl Into<String>, url: impl Into<String>, git_ref: Option<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            path: None,
            git: Some(url.into()),
            git_ref,
            base: None,
        }
    }

    /// Validate the declaration. Invalid declarations are fatal before any
    /// graph construction starts.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AgentpackError::DeclarationInvalid {
                message: "Dependency name cannot be empty".to_string(),
            });
        }

        if let Some(base) = &self.base {
            let base_path = Path::new(base);
            if base_path.is_absolute() || base.starts_with('/') {
                return Err(AgentpackError::DeclarationInvalid {
                    message: format!(
                        "Dependency '{}' has an absolute 'base' path '{}'; \
                         base must be a relative sub-path",
                        self.name, base
                    ),
                });
            }
            if base_path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(AgentpackError::DeclarationInvalid {
                    message: format!(
                        "Dependency '{}' has a 'base' path '{}' escaping its package",
                        self.name, base
                    ),
                });
            }
        }

        if let Some(range) = &self.version {
            VersionReq::parse(range).map_err(|e| AgentpackError::VersionRangeInvalid {
                package: self.name.clone(),
                range: range.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Check if this is a local dependency
    #[allow(dead_code)]
    pub fn is_local(&self) -> bool {
        self.git.is_none() && self.path.is_some()
    }
}

/// A package manifest (`agentpack.yaml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Package description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Package version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Declared dependencies, in declaration order
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,
}

impl Manifest {
    /// Parse a manifest from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: Manifest =
            serde_yaml::from_str(content).map_err(|e| AgentpackError::ManifestParseFailed {
                path: MANIFEST_FILE.to_string(),
                reason: e.to_string(),
            })?;
        Ok(manifest)
    }

    /// Read a manifest from a package content root, if one exists
    pub fn from_dir(dir: &Path) -> Result<Option<Self>> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
            AgentpackError::ManifestReadFailed {
                path: manifest_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Some(Self::from_yaml(&content)?))
    }
}

/// Collaborator port: supplies a package's own declared dependencies
/// during the graph walk.
pub trait ManifestSource {
    /// Declarations for the package at `source`. `None` means the source
    /// kind carries no manifest this collaborator can read (e.g. registry
    /// packages whose manifests live in a later phase).
    fn declarations_for(&self, source: &PackageSource) -> Result<Option<Vec<DependencyDecl>>>;
}

/// Default manifest source: reads `agentpack.yaml` from path-backed
/// content roots (local directories and pre-fetched git checkouts).
pub struct FileManifestSource {
    workspace_root: PathBuf,
}

impl FileManifestSource {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    fn content_root_of(&self, source: &PackageSource) -> Option<PathBuf> {
        match source {
            PackageSource::Path { path } => {
                if path.is_absolute() {
                    Some(path.clone())
                } else {
                    Some(self.workspace_root.join(path))
                }
            }
            PackageSource::Git {
                content_root,
                subpath,
                ..
            } => content_root.as_ref().map(|root| match subpath {
                Some(sub) => root.join(sub),
                None => root.clone(),
            }),
            PackageSource::Registry { .. } => None,
        }
    }
}

impl ManifestSource for FileManifestSource {
    fn declarations_for(&self, source: &PackageSource) -> Result<Option<Vec<DependencyDecl>>> {
        let Some(root) = self.content_root_of(source) else {
            return Ok(None);
        };

        Ok(Manifest::from_dir(&root)?.map(|m| m.dependencies))
    }
}
