//! Checksums of migration files

use crate::error::{OrmError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Hexadecimal SHA-256 of `content`
pub fn checksum_of(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Calculate the SHA-256 checksum of a migration file
///
/// # Arguments
///
/// * `migration_file_path` - Path to the migration file
///
/// # Returns
///
/// Returns the hexadecimal SHA-256 hash of the file content
///
/// # Errors
///
/// Returns `OrmError::Io` if the file cannot be read
pub fn calculate_checksum(migration_file_path: &Path) -> Result<String> {
    let content = fs::read_to_string(migration_file_path).map_err(OrmError::Io)?;
    Ok(checksum_of(&content))
}
