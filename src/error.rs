//! Error types and handling for agentpack
//!
//! Uses `thiserror` for error definitions and `miette` for pretty diagnostics.
//!
//! Node-level failures (a package that fails to load or install) are captured
//! into per-node results by the executor and never propagate as errors past
//! its boundary; the variants here cover whole-run failures and the fatal
//! pre-graph validation cases.

use miette::Diagnostic;
use thiserror::Error;

/// Main error type for agentpack operations
#[derive(Error, Diagnostic, Debug)]
pub enum AgentpackError {
    // Package errors
    #[error("Package '{name}' not found")]
    #[diagnostic(
        code(agentpack::package::not_found),
        help("Check that the package name is correct and the source is accessible")
    )]
    PackageNotFound { name: String },

    #[error("Invalid package name: {name}")]
    #[diagnostic(
        code(agentpack::package::invalid_name),
        help("Package names follow the format name, name/resource or gh@owner/repo[/resource]")
    )]
    InvalidPackageName { name: String },

    // Declaration errors (fatal, pre-graph)
    #[error("Invalid dependency declaration: {message}")]
    #[diagnostic(
        code(agentpack::declaration::invalid),
        help("Declarations need a source (registry name, git URL or relative path) and a relative 'base'")
    )]
    DeclarationInvalid { message: String },

    #[error("Invalid version range '{range}' for '{package}': {reason}")]
    #[diagnostic(code(agentpack::declaration::bad_range))]
    VersionRangeInvalid {
        package: String,
        range: String,
        reason: String,
    },

    // Source errors
    #[error("Invalid source URL: {url}")]
    #[diagnostic(
        code(agentpack::source::invalid_url),
        help("Valid formats: ./path, gh@owner/repo, github:owner/repo, https://github.com/owner/repo.git")
    )]
    InvalidSourceUrl { url: String },

    #[error("Failed to parse source: {input}")]
    #[diagnostic(code(agentpack::source::parse_failed))]
    SourceParseFailed { input: String, reason: String },

    #[error("Failed to load package '{name}': {reason}")]
    #[diagnostic(code(agentpack::source::load_failed))]
    SourceLoadFailed { name: String, reason: String },

    // Version solving errors
    #[error("Version conflict for '{package}': requested {ranges}")]
    #[diagnostic(
        code(agentpack::solver::conflict),
        help("Re-run with force, or align the requested version ranges")
    )]
    VersionConflict { package: String, ranges: String },

    #[error("No registry index available to resolve '{name}'")]
    #[diagnostic(code(agentpack::solver::no_registry))]
    RegistryUnavailable { name: String },

    // Dependency errors
    #[error("Circular dependency detected: {chain}")]
    #[diagnostic(
        code(agentpack::graph::circular),
        help("Remove the circular dependency from the package manifests")
    )]
    CircularDependency { chain: String },

    // Manifest errors
    #[error("Failed to read manifest: {path}")]
    #[diagnostic(code(agentpack::manifest::read_failed))]
    ManifestReadFailed { path: String, reason: String },

    #[error("Failed to parse manifest: {path}")]
    #[diagnostic(code(agentpack::manifest::parse_failed))]
    ManifestParseFailed { path: String, reason: String },

    // Ledger errors
    #[error("Failed to read ownership ledger: {path}")]
    #[diagnostic(code(agentpack::ledger::read_failed))]
    LedgerReadFailed { path: String, reason: String },

    #[error("Failed to parse ownership ledger: {path}")]
    #[diagnostic(
        code(agentpack::ledger::parse_failed),
        help("The ledger file is corrupt; restore it from version control or remove it")
    )]
    LedgerParseFailed { path: String, reason: String },

    #[error("Failed to write ownership ledger: {path}")]
    #[diagnostic(code(agentpack::ledger::write_failed))]
    LedgerWriteFailed { path: String, reason: String },

    // File system errors
    #[error("File not found: {path}")]
    #[diagnostic(code(agentpack::fs::not_found))]
    FileNotFound { path: String },

    #[error("Failed to read file: {path}")]
    #[diagnostic(code(agentpack::fs::read_failed))]
    FileReadFailed { path: String, reason: String },

    #[error("Failed to write file: {path}")]
    #[diagnostic(code(agentpack::fs::write_failed))]
    FileWriteFailed { path: String, reason: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(agentpack::fs::io_error))]
    IoError { message: String },

    // Port errors
    #[error("Interactive prompt failed: {reason}")]
    #[diagnostic(code(agentpack::prompt::failed))]
    PromptFailed { reason: String },
}

impl From<std::io::Error> for AgentpackError {
    fn from(err: std::io::Error) -> Self {
        AgentpackError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for AgentpackError {
    fn from(err: serde_yaml::Error) -> Self {
        AgentpackError::ManifestParseFailed {
            path: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentpackError {
    fn from(err: serde_json::Error) -> Self {
        AgentpackError::LedgerParseFailed {
            path: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<inquire::InquireError> for AgentpackError {
    fn from(err: inquire::InquireError) -> Self {
        AgentpackError::PromptFailed {
            reason: err.to_string(),
        }
    }
}

/// Result type alias using miette for error handling
pub type Result<T> = miette::Result<T, AgentpackError>;
