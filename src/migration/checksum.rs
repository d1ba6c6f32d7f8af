//! Checksum calculation for migrations

use super::migration::Migration;
use super::schema_manager::SchemaManager;
use crate::executor::DbError;
use sha2::{Digest, Sha256};

/// SHA-256 over the DDL a migration's `up()` generates, one statement per line.
///
/// # Errors
///
/// Returns whatever `up()` returns when it fails to build its statements.
pub fn calculate_checksum(migration: &dyn Migration) -> Result<String, DbError> {
    let manager = SchemaManager::recording();
    migration.up(&manager)?;

    let mut hasher = Sha256::new();
    for statement in manager.recorded() {
        hasher.update(statement.as_bytes());
        hasher.update(b"\n");
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Validate checksum against stored value
///
/// # Errors
///
/// Returns `DbError::Other` if the checksums differ.
pub fn validate_checksum(stored_checksum: &str, current_checksum: &str) -> Result<(), DbError> {
    if stored_checksum == current_checksum {
        Ok(())
    } else {
        Err(DbError::Other(format!(
            "Checksum mismatch: stored={}, current={}",
            stored_checksum, current_checksum
        )))
    }
}
