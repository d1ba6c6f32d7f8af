//! Schema migrations, applied in-process.
//!
//! Migrations are Rust values implementing [`Migration`]; their `up()` builds
//! sea-query DDL against a [`SchemaManager`]. Applied versions are tracked in
//! `larder_migrations` together with a SHA-256 checksum of the DDL each one
//! generated, so an edited migration is detected on the next start.
//!
//! # Example
//!
//! ```rust,no_run
//! use larder::migration::{Migration, SchemaManager};
//! use larder::DbError;
//! use sea_query::{ColumnDef, Table};
//!
//! pub struct CreateNotesTable;
//!
//! impl Migration for CreateNotesTable {
//!     fn name(&self) -> &str {
//!         "create_notes_table"
//!     }
//!
//!     fn version(&self) -> i64 {
//!         20250301090000
//!     }
//!
//!     fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
//!         let table = Table::create()
//!             .table("notes")
//!             .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
//!             .col(ColumnDef::new("body").text().not_null())
//!             .to_owned();
//!         manager.create_table(table)
//!     }
//!
//!     fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
//!         manager.drop_table(Table::drop().table("notes").to_owned())
//!     }
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod lock;
pub mod migration;
pub mod migrator;
pub mod record;
pub mod schema;
pub mod schema_manager;
pub mod startup;
pub mod state_table;
pub mod status;

pub use checksum::{calculate_checksum, validate_checksum};
pub use error::MigrationError;
pub use lock::MigrationLockGuard;
pub use migration::Migration;
pub use migrator::Migrator;
pub use record::MigrationRecord;
pub use schema_manager::SchemaManager;
pub use startup::startup_migrations;
pub use state_table::{initialize_state_table, STATE_TABLE};
pub use status::{MigrationStatus, PendingMigration};
