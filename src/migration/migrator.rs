//! Migrator - Core migration execution engine

use crate::executor::DbExecutor;
use crate::migration::{
    calculate_checksum, initialize_state_table, Migration, MigrationError, MigrationLockGuard,
    MigrationRecord, MigrationStatus, PendingMigration, SchemaManager, STATE_TABLE,
};
use crate::raw_sql::find_all_by_statement;
use std::time::Instant;

/// Applies a fixed, ordered list of migrations and tracks them in
/// `larder_migrations`.
pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
}

impl Migrator {
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> Self {
        migrations.sort_by_key(|m| m.version());
        Self { migrations }
    }

    /// The reservation schema shipped with this crate.
    pub fn larder() -> Self {
        Self::new(super::schema::migrations())
    }

    pub fn migrations(&self) -> &[Box<dyn Migration>] {
        &self.migrations
    }

    /// Compare the migrations of this build with the state table.
    ///
    /// # Errors
    ///
    /// `ChecksumMismatch` if an applied migration now generates different DDL,
    /// `UnknownVersion` if the database has a migration this build lacks.
    pub fn status(&self, executor: &dyn DbExecutor) -> Result<MigrationStatus, MigrationError> {
        initialize_state_table(executor)?;
        let applied = Self::query_applied_migrations(executor)?;

        for record in &applied {
            if !self.migrations.iter().any(|m| m.version() == record.version) {
                return Err(MigrationError::UnknownVersion {
                    version: record.version,
                    name: record.name.clone(),
                });
            }
        }

        let mut pending = Vec::new();
        for migration in &self.migrations {
            let checksum = calculate_checksum(migration.as_ref())?;
            match applied.iter().find(|r| r.version == migration.version()) {
                Some(record) if record.checksum != checksum => {
                    return Err(MigrationError::ChecksumMismatch {
                        version: record.version,
                        name: record.name.clone(),
                        stored: record.checksum.clone(),
                        current: checksum,
                    });
                }
                Some(_) => {}
                None => pending.push(PendingMigration {
                    version: migration.version(),
                    name: migration.name().to_string(),
                    checksum,
                }),
            }
        }

        Ok(MigrationStatus::new(applied, pending))
    }

    /// # Errors
    ///
    /// See [`Migrator::status`].
    pub fn validate_checksums(&self, executor: &dyn DbExecutor) -> Result<(), MigrationError> {
        self.status(executor).map(|_| ())
    }

    /// Apply pending migrations (all of them, or the first `steps`), assuming
    /// the caller holds the migration lock.
    ///
    /// # Errors
    ///
    /// `ExecutionFailed` for the first migration whose `up()` fails; the ones
    /// before it stay applied.
    pub fn up_with_lock(&self, executor: &dyn DbExecutor, steps: Option<usize>) -> Result<usize, MigrationError> {
        let status = self.status(executor)?;
        let manager = SchemaManager::new(executor);
        let mut applied_count = 0;

        for pending in status.pending.iter().take(steps.unwrap_or(usize::MAX)) {
            let Some(migration) = self.find(pending.version) else {
                continue;
            };

            let start = Instant::now();
            migration
                .up(&manager)
                .map_err(|e| MigrationError::ExecutionFailed {
                    version: pending.version,
                    name: pending.name.clone(),
                    error: e.to_string(),
                })?;
            let execution_time_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

            Self::record_migration(executor, pending, execution_time_ms)?;
            log::info!(
                "applied migration {} ({}) in {}ms",
                pending.version,
                pending.name,
                execution_time_ms
            );
            applied_count += 1;
        }

        Ok(applied_count)
    }

    /// Acquire the lock, then apply pending migrations.
    ///
    /// # Errors
    ///
    /// See [`Migrator::up_with_lock`]; also `LockTimeout`.
    pub fn up(&self, executor: &dyn DbExecutor, steps: Option<usize>, timeout_seconds: Option<u64>) -> Result<usize, MigrationError> {
        initialize_state_table(executor)?;
        let lock = MigrationLockGuard::new(executor, timeout_seconds)?;
        self.up_with_lock(lock.executor(), steps)
    }

    /// Roll back the latest `steps` applied migrations (default 1), assuming
    /// the caller holds the migration lock.
    ///
    /// # Errors
    ///
    /// `ExecutionFailed` for the first migration whose `down()` fails.
    pub fn down_with_lock(&self, executor: &dyn DbExecutor, steps: Option<usize>) -> Result<usize, MigrationError> {
        let status = self.status(executor)?;
        let manager = SchemaManager::new(executor);
        let mut rolled_back = 0;

        for record in status.applied.iter().rev().take(steps.unwrap_or(1)) {
            let Some(migration) = self.find(record.version) else {
                continue;
            };
            migration
                .down(&manager)
                .map_err(|e| MigrationError::ExecutionFailed {
                    version: record.version,
                    name: record.name.clone(),
                    error: e.to_string(),
                })?;
            Self::remove_migration_record(executor, record.version)?;
            log::info!("rolled back migration {} ({})", record.version, record.name);
            rolled_back += 1;
        }

        Ok(rolled_back)
    }

    /// Acquire the lock, then roll back.
    ///
    /// # Errors
    ///
    /// See [`Migrator::down_with_lock`]; also `LockTimeout`.
    pub fn down(&self, executor: &dyn DbExecutor, steps: Option<usize>, timeout_seconds: Option<u64>) -> Result<usize, MigrationError> {
        initialize_state_table(executor)?;
        let lock = MigrationLockGuard::new(executor, timeout_seconds)?;
        self.down_with_lock(lock.executor(), steps)
    }

    fn find(&self, version: i64) -> Option<&dyn Migration> {
        self.migrations
            .iter()
            .find(|m| m.version() == version)
            .map(|m| m.as_ref())
    }

    fn query_applied_migrations(executor: &dyn DbExecutor) -> Result<Vec<MigrationRecord>, MigrationError> {
        let sql = format!(
            "SELECT version, name, checksum, applied_at, execution_time_ms, success \
             FROM {STATE_TABLE} WHERE version > 0 ORDER BY version"
        );
        let records = find_all_by_statement(executor, &sql, &[])?
            .iter()
            .map(MigrationRecord::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn record_migration(
        executor: &dyn DbExecutor,
        pending: &PendingMigration,
        execution_time_ms: i64,
    ) -> Result<(), MigrationError> {
        let sql = format!(
            "INSERT INTO {STATE_TABLE} (version, name, checksum, applied_at, execution_time_ms, success) \
             VALUES ($1, $2, $3, NOW(), $4, true)"
        );
        executor.execute(
            &sql,
            &[&pending.version, &pending.name, &pending.checksum, &execution_time_ms],
        )?;
        Ok(())
    }

    fn remove_migration_record(executor: &dyn DbExecutor, version: i64) -> Result<(), MigrationError> {
        let sql = format!("DELETE FROM {STATE_TABLE} WHERE version = $1");
        executor.execute(&sql, &[&version])?;
        Ok(())
    }
}
