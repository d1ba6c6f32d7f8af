//! `MigrationRecord` - Represents entries in the `larder_migrations` state table

use crate::executor::DbError;
use crate::raw_sql::column;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,
    pub name: String,
    /// `SHA-256` checksum of the generated DDL
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    /// Execution time in milliseconds (`None` if not recorded)
    pub execution_time_ms: Option<i64>,
    pub success: bool,
}

impl MigrationRecord {
    /// # Errors
    ///
    /// Returns `DbError::Parse` if a column is missing or has an unexpected type.
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        Ok(Self {
            version: column(row, "version")?,
            name: column(row, "name")?,
            checksum: column(row, "checksum")?,
            applied_at: column(row, "applied_at")?,
            execution_time_ms: column(row, "execution_time_ms")?,
            success: column(row, "success")?,
        })
    }
}
