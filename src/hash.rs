//! BLAKE3 hashing utilities for package content integrity
//!
//! Content hashes drive idempotent reinstall: a target whose on-disk
//! content already matches the incoming file is never rewritten.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use blake3::Hasher;
use walkdir::WalkDir;

use crate::error::{AgentpackError, Result};
use crate::ledger::LEDGER_FILE;

/// Hash prefix for BLAKE3 hashes
pub const HASH_PREFIX: &str = "blake3:";

fn hash_reader_into(hasher: &mut Hasher, path: &Path) -> Result<()> {
    let file = File::open(path).map_err(|e| AgentpackError::FileReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut reader = BufReader::new(file);
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| AgentpackError::FileReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(())
}

/// Calculate BLAKE3 hash of a file
pub fn hash_file(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    hash_reader_into(&mut hasher, path)?;
    Ok(format!("{}{}", HASH_PREFIX, hasher.finalize().to_hex()))
}

/// Calculate BLAKE3 hash of a directory's contents
///
/// Hashes all files recursively, sorted by path for deterministic results.
/// The ownership ledger file is excluded so reinstalls do not feed the hash
/// back into itself.
pub fn hash_directory(path: &Path) -> Result<String> {
    if !path.is_dir() {
        return Err(AgentpackError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let mut hasher = Hasher::new();
    let mut files: Vec<_> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy() != LEDGER_FILE)
        .collect();

    // Sort for deterministic hashing
    files.sort_by_key(|e| e.path().to_path_buf());

    for entry in files {
        let file_path = entry.path();

        // Include relative path in hash for uniqueness
        let relative_path = file_path
            .strip_prefix(path)
            .unwrap_or(file_path)
            .to_string_lossy()
            .replace('\\', "/");
        hasher.update(relative_path.as_bytes());
        hasher.update(b"\0");

        hash_reader_into(&mut hasher, file_path)?;
        hasher.update(b"\0");
    }

    Ok(format!("{}{}", HASH_PREFIX, hasher.finalize().to_hex()))
}

/// Check whether two paths currently hold identical content
///
/// Missing files are never identical to anything.
pub fn same_content(a: &Path, b: &Path) -> bool {
    if !a.is_file() || !b.is_file() {
        return false;
    }
    match (hash_file(a), hash_file(b)) {
        (Ok(ha), Ok(hb)) => ha == hb,
        _ => false,
    }
}
