//! Migration state table management

use crate::executor::{DbError, DbExecutor};
use sea_query::{ColumnDef, Expr, Index, IndexCreateStatement, PostgresQueryBuilder, Table, TableCreateStatement};

pub const STATE_TABLE: &str = "larder_migrations";

/// The `larder_migrations` table.
///
/// Holds one row per applied migration (version, name, checksum, applied
/// timestamp, execution time, success) plus, while a migration run is in
/// progress, the lock row with version `-1`.
pub fn create_state_table() -> TableCreateStatement {
    Table::create()
        .table(STATE_TABLE)
        .if_not_exists()
        .col(ColumnDef::new("version").big_integer().not_null().primary_key())
        .col(ColumnDef::new("name").string().string_len(255).not_null())
        .col(ColumnDef::new("checksum").string().string_len(64).not_null())
        .col(
            ColumnDef::new("applied_at")
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(ColumnDef::new("execution_time_ms").big_integer().null())
        .col(ColumnDef::new("success").boolean().not_null().default(true))
        .to_owned()
}

/// Create index on `applied_at` for faster queries
pub fn create_state_table_index() -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name("idx_larder_migrations_applied_at")
        .table(STATE_TABLE)
        .col(Expr::col("applied_at"))
        .to_owned()
}

/// Create the state table and its index if they don't exist.
///
/// # Errors
///
/// Returns `DbError` if either statement fails.
pub fn initialize_state_table(executor: &dyn DbExecutor) -> Result<(), DbError> {
    executor.execute(&create_state_table().build(PostgresQueryBuilder), &[])?;
    executor.execute(&create_state_table_index().build(PostgresQueryBuilder), &[])?;
    Ok(())
}
