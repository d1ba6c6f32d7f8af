//! Migration trait definition

use super::schema_manager::SchemaManager;
use crate::executor::DbError;

/// A single, versioned schema change.
///
/// `up()` must be deterministic: its generated DDL is hashed into the
/// checksum stored when the migration is applied.
pub trait Migration: Send + Sync {
    /// Human-readable identifier
    fn name(&self) -> &str;

    /// Timestamp version (`YYYYMMDDHHMMSS`); applied in ascending order
    fn version(&self) -> i64;

    /// Apply the migration.
    ///
    /// Runs synchronously; on the `may` runtime the driver yields the
    /// coroutine while a statement is in flight.
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError>;

    /// Undo the migration.
    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError>;
}
