//! Flyway-style migration table-based locking mechanism

use crate::executor::DbExecutor;
use crate::migration::MigrationError;
use crate::query::{classify, ErrorClass};
use std::time::{Duration, Instant};

/// Version of the lock row; real migrations use positive timestamps.
const LOCK_VERSION: i64 = -1;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Holds the migration lock; releases it when dropped.
pub struct MigrationLockGuard<'a> {
    executor: &'a dyn DbExecutor,
}

impl<'a> MigrationLockGuard<'a> {
    /// Wait up to `timeout_seconds` (default 60) for the lock row.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if the lock cannot be acquired.
    pub fn new(executor: &'a dyn DbExecutor, timeout_seconds: Option<u64>) -> Result<Self, MigrationError> {
        acquire_migration_lock(executor, timeout_seconds.unwrap_or(60))?;
        Ok(Self { executor })
    }

    pub fn executor(&self) -> &'a dyn DbExecutor {
        self.executor
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = release_migration_lock(self.executor) {
            log::warn!("failed to release migration lock: {e}");
        }
    }
}

/// Insert the lock row; whoever inserts it holds the lock.
///
/// Polls every 100ms until the row can be inserted or `timeout_seconds`
/// passes. Each attempt runs under a 5s statement timeout so a stuck server
/// cannot hang the loop.
///
/// # Errors
///
/// `LockTimeout` when the deadline passes, `Database` for any other failure.
pub fn acquire_migration_lock(executor: &dyn DbExecutor, timeout_seconds: u64) -> Result<(), MigrationError> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_seconds);

    // Session-level; reset on every exit path below
    let _ = executor.execute("SET statement_timeout = '5s'", &[]);
    let reset = || {
        let _ = executor.execute("RESET statement_timeout", &[]);
    };

    let sql = format!(
        "INSERT INTO {} (version, name, checksum, applied_at, success) \
         VALUES ({LOCK_VERSION}, 'LOCK', 'lock', NOW(), true) \
         ON CONFLICT (version) DO NOTHING",
        super::STATE_TABLE
    );

    loop {
        if start.elapsed() >= timeout {
            reset();
            return Err(MigrationError::LockTimeout(format!(
                "could not acquire the migration lock within {timeout_seconds} seconds"
            )));
        }

        match executor.execute(&sql, &[]) {
            Ok(inserted) if inserted > 0 => {
                reset();
                log::debug!("migration lock acquired");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if classify(&e) == ErrorClass::Canceled => {
                log::warn!("migration lock attempt timed out, retrying");
            }
            Err(e) => {
                reset();
                return Err(MigrationError::Database(e));
            }
        }

        may::coroutine::sleep(POLL_INTERVAL);
    }
}

/// # Errors
///
/// Returns `MigrationError::Database` if the delete fails.
pub fn release_migration_lock(executor: &dyn DbExecutor) -> Result<(), MigrationError> {
    let sql = format!("DELETE FROM {} WHERE version = $1", super::STATE_TABLE);
    executor.execute(&sql, &[&LOCK_VERSION])?;
    Ok(())
}
