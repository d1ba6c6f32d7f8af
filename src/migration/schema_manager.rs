//! SchemaManager - Provides methods for schema operations in migrations

use crate::executor::{DbError, DbExecutor};
use sea_query::{
    IndexCreateStatement, IndexDropStatement, PostgresQueryBuilder, TableAlterStatement,
    TableCreateStatement, TableDropStatement,
};
use std::cell::RefCell;

enum Target<'a> {
    Execute(&'a dyn DbExecutor),
    Record(RefCell<Vec<String>>),
}

/// Runs the DDL a migration builds.
///
/// A recording manager executes nothing and keeps the generated SQL instead;
/// the checksum of a migration is taken from that recording.
pub struct SchemaManager<'a> {
    target: Target<'a>,
}

impl<'a> SchemaManager<'a> {
    pub fn new(executor: &'a dyn DbExecutor) -> Self {
        Self {
            target: Target::Execute(executor),
        }
    }

    pub fn recording() -> SchemaManager<'static> {
        SchemaManager {
            target: Target::Record(RefCell::new(Vec::new())),
        }
    }

    /// Statements seen so far by a recording manager.
    pub fn recorded(&self) -> Vec<String> {
        match &self.target {
            Target::Record(statements) => statements.borrow().clone(),
            Target::Execute(_) => Vec::new(),
        }
    }

    /// Create a table
    ///
    /// # Example
    /// ```rust,no_run
    /// # use larder::migration::SchemaManager;
    /// use sea_query::{Table, ColumnDef};
    ///
    /// # fn run(manager: &SchemaManager<'_>) -> Result<(), larder::DbError> {
    /// let table = Table::create()
    ///     .table("users")
    ///     .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
    ///     .col(ColumnDef::new("name").text().not_null())
    ///     .to_owned();
    ///
    /// manager.create_table(table)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_table(&self, table: TableCreateStatement) -> Result<(), DbError> {
        self.run(table.build(PostgresQueryBuilder))
    }

    pub fn drop_table(&self, table: TableDropStatement) -> Result<(), DbError> {
        self.run(table.build(PostgresQueryBuilder))
    }

    pub fn alter_table(&self, alter: TableAlterStatement) -> Result<(), DbError> {
        self.run(alter.build(PostgresQueryBuilder))
    }

    pub fn create_index(&self, index: IndexCreateStatement) -> Result<(), DbError> {
        self.run(index.build(PostgresQueryBuilder))
    }

    pub fn drop_index(&self, index: IndexDropStatement) -> Result<(), DbError> {
        self.run(index.build(PostgresQueryBuilder))
    }

    /// Raw DDL for what the builders cannot express (CHECK constraints).
    pub fn execute_raw(&self, sql: &str) -> Result<(), DbError> {
        self.run(sql.to_string())
    }

    fn run(&self, sql: String) -> Result<(), DbError> {
        match &self.target {
            // DDL statements don't have parameters
            Target::Execute(executor) => executor.execute(&sql, &[]).map(|_| ()),
            Target::Record(statements) => {
                statements.borrow_mut().push(sql);
                Ok(())
            }
        }
    }
}
