//! The boundary callers use: one method per inbound operation.
//!
//! Input is validated before a connection is taken from the pool. Each write
//! then runs in exactly one transaction on one pooled connection, bounded by
//! `reservations.statement_timeout_ms`; it commits when the operation returns
//! `Ok` and rolls back otherwise.

use crate::config::LarderConfig;
use crate::error::{ReservationError, ReservationResult};
use crate::executor::{DbError, PgExecutor};
use crate::migration::{startup_migrations, MigrationError, MigrationStatus, Migrator};
use crate::model::{
    Booking, BookingAction, BookingAmendment, BookingView, FridgeDetail, FridgeDraft, FridgeEdit,
    FridgeSummary, NewBooking,
};
use crate::pool::{DbPool, PoolError};
use crate::reconciler::{self, SweepReport};
use crate::transaction::Transaction;
use crate::views::{self, FridgeNode, Viewer};
use crate::{hierarchy, ledger};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub struct Larder {
    pool: DbPool,
    config: LarderConfig,
}

impl Larder {
    /// Open the pool described by `config.database`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError` if a connection cannot be opened.
    pub fn connect(config: LarderConfig) -> Result<Self, PoolError> {
        let pool = DbPool::connect(&config.database)?;
        Ok(Self { pool, config })
    }

    pub fn with_pool(pool: DbPool, config: LarderConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn config(&self) -> &LarderConfig {
        &self.config
    }

    /// Run `operation` inside one transaction on a pooled connection.
    ///
    /// # Errors
    ///
    /// Whatever `operation` returns, or `Storage` if the pool, `BEGIN` or
    /// `COMMIT` fails.
    pub fn in_transaction<T>(
        &self,
        name: &'static str,
        operation: impl FnOnce(&Transaction) -> ReservationResult<T>,
    ) -> ReservationResult<T> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(name).entered();

        let connection = self.pool.acquire()?;
        let transaction = connection.begin()?;
        transaction.set_statement_timeout(self.config.reservations.statement_timeout_ms)?;

        match operation(&transaction) {
            Ok(value) => {
                transaction.commit()?;
                Ok(value)
            }
            Err(err) => {
                match &err {
                    ReservationError::Storage(_) => log::error!("{name} rolled back: {err}"),
                    _ => log::warn!("{name} rolled back: {err}"),
                }
                if let Err(rollback) = transaction.rollback() {
                    log::warn!("{name}: rollback failed: {rollback}");
                }
                Err(err)
            }
        }
    }

    /// Run a read on a pooled connection, outside any explicit transaction.
    ///
    /// # Errors
    ///
    /// Whatever `read` returns, or `Storage` if the pool is exhausted.
    pub fn read<T>(
        &self,
        name: &'static str,
        read: impl FnOnce(&PgExecutor) -> ReservationResult<T>,
    ) -> ReservationResult<T> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span(name).entered();
        #[cfg(not(feature = "tracing"))]
        let _ = name;

        let connection = self.pool.acquire()?;
        read(&*connection)
    }

    // -- Query layer --

    pub fn list_fridge_tree(&self, fridge_id: Option<i64>) -> ReservationResult<Vec<FridgeNode>> {
        self.read("list_fridge_tree", |db| views::list_fridge_tree(db, fridge_id))
    }

    pub fn list_fridges(&self) -> ReservationResult<Vec<FridgeSummary>> {
        self.read("list_fridges", views::list_fridges)
    }

    pub fn get_fridge(&self, fridge_id: i64) -> ReservationResult<FridgeDetail> {
        self.read("get_fridge", |db| views::get_fridge(db, fridge_id))
    }

    pub fn list_bookings(&self, viewer: &Viewer) -> ReservationResult<Vec<BookingView>> {
        self.read("list_bookings", |db| views::list_bookings(db, viewer))
    }

    pub fn get_booking(&self, booking_id: i64) -> ReservationResult<BookingView> {
        self.read("get_booking", |db| views::get_booking(db, booking_id))
    }

    // -- Booking ledger --

    pub fn create_booking(&self, booking: &NewBooking) -> ReservationResult<Booking> {
        ledger::validate_new(booking)?;
        self.in_transaction("create_booking", |tx| ledger::create_booking(tx, booking))
    }

    pub fn update_booking(&self, amendment: &BookingAmendment) -> ReservationResult<Booking> {
        ledger::validate_amendment(amendment)?;
        self.in_transaction("update_booking", |tx| ledger::update_booking(tx, amendment))
    }

    /// `action` is the wire value, `"clear"` or `"cancel"`.
    pub fn clear_or_cancel_booking(
        &self,
        booking_id: i64,
        slot_id: i64,
        user_id: i64,
        action: &str,
    ) -> ReservationResult<Booking> {
        let action: BookingAction = action
            .parse()
            .map_err(|e| ReservationError::validation(format!("{e}")))?;
        self.in_transaction("clear_or_cancel_booking", |tx| {
            ledger::clear_or_cancel(tx, booking_id, slot_id, user_id, action)
        })
    }

    // -- Hierarchy store --

    pub fn create_fridge(
        &self,
        created_by: i64,
        draft: &FridgeDraft,
    ) -> ReservationResult<FridgeDetail> {
        hierarchy::validate_draft(draft)?;
        self.in_transaction("create_fridge", |tx| hierarchy::create_fridge(tx, created_by, draft))
    }

    pub fn update_fridge(
        &self,
        fridge_id: i64,
        updated_by: i64,
        edit: &FridgeEdit,
    ) -> ReservationResult<FridgeDetail> {
        hierarchy::validate_edit(edit)?;
        self.in_transaction("update_fridge", |tx| {
            hierarchy::update_fridge(tx, updated_by, fridge_id, edit)
        })
    }

    pub fn delete_fridge(&self, fridge_id: i64) -> ReservationResult<()> {
        self.in_transaction("delete_fridge", |tx| hierarchy::delete_fridge(tx, fridge_id))
    }

    // -- Availability reconciler --

    pub fn sweep(&self) -> ReservationResult<SweepReport> {
        self.in_transaction("sweep", reconciler::sweep)
    }

    // -- Schema --

    /// Apply pending migrations under the migration lock.
    ///
    /// # Errors
    ///
    /// See [`startup_migrations`].
    pub fn migrate(&self) -> Result<usize, MigrationError> {
        let connection = self.pool.acquire().map_err(pool_unavailable)?;
        startup_migrations(&*connection, None)
    }

    /// # Errors
    ///
    /// See [`Migrator::status`].
    pub fn migration_status(&self) -> Result<MigrationStatus, MigrationError> {
        let connection = self.pool.acquire().map_err(pool_unavailable)?;
        Migrator::larder().status(&*connection)
    }
}

fn pool_unavailable(err: PoolError) -> MigrationError {
    MigrationError::Database(DbError::Other(err.to_string()))
}
