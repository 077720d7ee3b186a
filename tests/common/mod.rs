//! Common test utilities for agentpack integration tests

use std::collections::HashMap;
use std::path::PathBuf;

use semver::Version;
use tempfile::TempDir;

use agentpack::error::Result;
use agentpack::solver::RegistryIndex;

/// A test workspace for integration tests
pub struct TestWorkspace {
    /// Temporary directory
    #[allow(dead_code)]
    pub temp: TempDir,
    /// Path to workspace root
    pub path: PathBuf,
}

#[allow(dead_code)]
impl TestWorkspace {
    /// Create a new test workspace
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let path = temp.path().to_path_buf();
        Self { temp, path }
    }

    /// Write a file in the workspace
    pub fn write_file(&self, path: &str, content: &str) {
        let file_path = self.path.join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&file_path, content).expect("Failed to write file");
    }

    /// Read a file from the workspace
    pub fn read_file(&self, path: &str) -> String {
        std::fs::read_to_string(self.path.join(path)).expect("Failed to read file")
    }

    /// Check if a file exists in the workspace
    pub fn file_exists(&self, path: &str) -> bool {
        self.path.join(path).exists()
    }

    /// Create a local package directory with the given files
    pub fn create_pack(&self, dir: &str, files: &[(&str, &str)]) -> PathBuf {
        let pack_path = self.path.join(dir);
        for (rel, content) in files {
            let file_path = pack_path.join(rel);
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create pack directory");
            }
            std::fs::write(&file_path, content).expect("Failed to write pack file");
        }
        pack_path
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory registry backed by a temp directory of published packages
#[derive(Clone)]
pub struct TestRegistry {
    root: PathBuf,
    versions: HashMap<String, Vec<Version>>,
}

#[allow(dead_code)]
impl TestRegistry {
    /// Create a registry storing content under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            versions: HashMap::new(),
        }
    }

    /// Publish one version of a package with the given files
    pub fn publish(&mut self, package: &str, version: &str, files: &[(&str, &str)]) {
        let parsed = Version::parse(version).expect("valid test version");
        let content_dir = self.root.join(package).join(version);
        for (rel, content) in files {
            let file_path = content_dir.join(rel);
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create registry directory");
            }
            std::fs::write(&file_path, content).expect("Failed to write registry file");
        }
        // Directory exists even for file-less publishes
        std::fs::create_dir_all(&content_dir).expect("Failed to create registry directory");
        self.versions
            .entry(package.to_string())
            .or_default()
            .push(parsed);
    }
}

impl RegistryIndex for TestRegistry {
    fn versions(&self, package: &str) -> Result<Vec<Version>> {
        Ok(self.versions.get(package).cloned().unwrap_or_default())
    }

    fn content_root(&self, package: &str, version: &Version) -> Result<PathBuf> {
        Ok(self.root.join(package).join(version.to_string()))
    }
}
