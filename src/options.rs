//! Normalized run options for a resolution session

use serde::{Deserialize, Serialize};

/// Strategy applied when a package's target path conflicts with an
/// existing claim in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Write every target as-is, ignoring existing claims
    Overwrite,
    /// Drop conflicting targets and leave existing files untouched
    Skip,
    /// Rewrite conflicting targets under the package's namespace segment
    Namespace,
    /// Defer the decision to the injected conflict-decision port;
    /// degrades to `Skip` when no port is available
    Ask,
}

/// Which sources a resolution run may reach for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMode {
    /// Registry preferred when a declaration names both registry and git
    Default,
    /// Never touch network-backed sources; git nodes without a pre-fetched
    /// checkout are skipped
    LocalOnly,
    /// Git preferred when a declaration names both registry and git
    RemotePrimary,
}

/// Normalized options for one resolution run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Resolve version conflicts deterministically instead of failing
    #[serde(default)]
    pub force: bool,

    /// Stop scheduling installs after the first failure
    #[serde(default)]
    pub fail_fast: bool,

    /// Report the plan without writing any files
    #[serde(default)]
    pub dry_run: bool,

    /// Conflict handling strategy
    pub conflict_strategy: ConflictStrategy,

    /// Source reachability mode
    pub resolution_mode: ResolutionMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            fail_fast: false,
            dry_run: false,
            conflict_strategy: ConflictStrategy::Namespace,
            resolution_mode: ResolutionMode::Default,
        }
    }
}
