//! Package source handling
//!
//! This module parses and identifies package sources across the three
//! supported kinds:
//! - Registry packages: `toolkit`, `toolkit@^1.0.0`, `toolkit/agents/reviewer`
//! - Git repositories: `gh@owner/repo`, `gh@owner/repo/agents/a1#main`,
//!   `github:owner/repo`, `https://github.com/owner/repo.git`,
//!   `git@github.com:owner/repo.git`
//! - Local directories: `./packs/my-pack`, `../shared-pack`, `/abs/path`
//!
//! Identity for graph and ledger purposes is the derived [`source_key`]
//! (normalized git URL, canonical absolute path, or registry base name),
//! never the raw input string.
//!
//! ## Module organization
//!
//! - `git_url.rs`: git URL normalization and owner/repo extraction
//! - `name.rs`: package-name scoping and namespace slug derivation

pub mod git_url;
pub mod name;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AgentpackError, Result};

/// Discriminant for source-kind dispatch (loader factory)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Registry,
    Git,
    Path,
}

/// A parsed package source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PackageSource {
    /// Registry package, optionally pinned to a version range
    Registry {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// Git repository source
    Git {
        /// Repository URL (normalized https or ssh form)
        url: String,
        /// Git ref (branch, tag, or SHA)
        #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
        git_ref: Option<String>,
        /// Resource sub-path within the repository
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subpath: Option<String>,
        /// Already-fetched checkout of the repository, provided by the
        /// source fetcher collaborator. The core never clones.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_root: Option<PathBuf>,
    },
    /// Local directory source
    Path { path: PathBuf },
}

impl PackageSource {
    /// Parse a package source from a string.
    ///
    /// Bare `owner/repo` shorthand is deliberately not treated as git: a
    /// slash also appears in resource-scoped registry names, so git
    /// shorthands must carry a `gh@` or `github:` prefix.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if input.is_empty() {
            return Err(AgentpackError::InvalidSourceUrl {
                url: input.to_string(),
            });
        }

        // Local paths first
        let path = Path::new(input);
        let is_local_path = input.starts_with("./")
            || input.starts_with("../")
            || input == "."
            || input == ".."
            || path.is_absolute()
            || input.starts_with('/');

        if is_local_path {
            return Ok(PackageSource::Path {
                path: PathBuf::from(input),
            });
        }

        // Git forms
        if input.starts_with("gh@")
            || input.starts_with("github:")
            || input.starts_with("https://")
            || input.starts_with("git@")
            || input.starts_with("ssh://")
        {
            return Self::parse_git(input);
        }

        // Registry name, optionally `name@range`
        let (pkg_name, version) = match input.split_once('@') {
            Some((n, v)) if !n.is_empty() && !v.is_empty() => (n, Some(v.to_string())),
            _ => (input, None),
        };

        if pkg_name.is_empty() || pkg_name.contains("://") {
            return Err(AgentpackError::InvalidSourceUrl {
                url: input.to_string(),
            });
        }

        Ok(PackageSource::Registry {
            name: pkg_name.to_string(),
            version,
        })
    }

    /// Parse a git source, splitting off `#ref` and a resource sub-path
    fn parse_git(input: &str) -> Result<Self> {
        let (main_part, git_ref) = git_url::parse_fragment(input);

        let (url_part, subpath) = git_url::split_scoped_path(main_part);
        let url = git_url::normalize(url_part)?;

        Ok(PackageSource::Git {
            url,
            git_ref: git_ref.map(str::to_string),
            subpath,
            content_root: None,
        })
    }

    /// Source-kind discriminant for loader dispatch
    pub fn kind(&self) -> SourceKind {
        match self {
            PackageSource::Registry { .. } => SourceKind::Registry,
            PackageSource::Git { .. } => SourceKind::Git,
            PackageSource::Path { .. } => SourceKind::Path,
        }
    }

    /// Derived identity key: normalized git URL, canonical absolute path,
    /// or registry base name.
    ///
    /// Two declarations that reach the same repository, directory or
    /// registry package produce the same key regardless of how they were
    /// spelled.
    pub fn source_key(&self) -> String {
        match self {
            PackageSource::Registry { name, .. } => name::split_scoped(name).0.to_string(),
            PackageSource::Git { url, .. } => git_url::canonical_key(url),
            PackageSource::Path { path } => dunce::canonicalize(path)
                .unwrap_or_else(|_| path.clone())
                .display()
                .to_string(),
        }
    }

    /// Resource sub-path scoping this source below its package root, if any
    pub fn resource_path(&self) -> Option<&str> {
        match self {
            PackageSource::Registry { name, .. } => name::split_scoped(name).1,
            PackageSource::Git { subpath, .. } => subpath.as_deref(),
            PackageSource::Path { .. } => None,
        }
    }

    /// Display string for reporting
    pub fn display_url(&self) -> String {
        match self {
            PackageSource::Registry { name, version } => match version {
                Some(v) => format!("{name}@{v}"),
                None => name.clone(),
            },
            PackageSource::Git {
                url,
                git_ref,
                subpath,
                ..
            } => {
                let mut out = url.clone();
                if let Some(p) = subpath {
                    out.push(':');
                    out.push_str(p);
                }
                if let Some(r) = git_ref {
                    out.push('#');
                    out.push_str(r);
                }
                out
            }
            PackageSource::Path { path } => path.display().to_string(),
        }
    }

    #[allow(dead_code)] // Used by tests
    pub fn is_local(&self) -> bool {
        matches!(self, PackageSource::Path { .. })
    }

    #[allow(dead_code)] // Used by tests
    pub fn is_git(&self) -> bool {
        matches!(self, PackageSource::Git { .. })
    }
}
