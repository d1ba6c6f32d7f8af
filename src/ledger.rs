//! Booking ledger: create, amend and terminate bookings.
//!
//! Every operation here expects to run inside one transaction together with
//! the slot flag change it implies. Reserving a slot is a compare-and-set on
//! `slots.is_disabled`; two bookings racing for the same slot see exactly one
//! winner, and the loser gets [`ReservationError::Conflict`] with nothing
//! written.

use crate::diff;
use crate::error::{ReservationError, ReservationResult};
use crate::executor::{DbError, DbExecutor};
use crate::model::{Booking, BookingAction, BookingAmendment, Item, ItemDraft, Keyed, NewBooking};
use crate::query::{classify, ErrorClass};
use crate::raw_sql::{
    column, execute_built, find_all_by_statement, find_optional_by_statement, query_value,
};
use chrono::{DateTime, Utc};
use sea_query::Query;
use std::collections::HashSet;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

pub(crate) const BOOKING_COLUMNS: &str = "id, slot_id, user_id, start_time, end_time, note, \
     cancelled_at, cancelled_by, cleared_at, cleared_by, created_at, updated_at";

/// # Errors
///
/// Returns `ReservationError::Validation` for an empty or inverted time
/// window and for malformed item lines.
pub fn validate_new(booking: &NewBooking) -> ReservationResult<()> {
    validate_window(booking.start_time, booking.end_time)?;
    validate_items(&booking.items)
}

/// # Errors
///
/// Same rules as [`validate_new`].
pub fn validate_amendment(amendment: &BookingAmendment) -> ReservationResult<()> {
    validate_window(amendment.start_time, amendment.end_time)?;
    validate_items(&amendment.items)
}

fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> ReservationResult<()> {
    if end <= start {
        return Err(ReservationError::validation(
            "end_time must be later than start_time",
        ));
    }
    Ok(())
}

fn validate_items(items: &[ItemDraft]) -> ReservationResult<()> {
    let mut seen = HashSet::new();
    for (index, item) in items.iter().enumerate() {
        if item.name.trim().is_empty() {
            return Err(ReservationError::validation(format!(
                "item #{} needs a name",
                index + 1
            )));
        }
        if item.quantity < 1 {
            return Err(ReservationError::validation(format!(
                "item '{}' needs a quantity of at least 1",
                item.name.trim()
            )));
        }
        if let Some(id) = item.persisted_id() {
            if !seen.insert(id) {
                return Err(ReservationError::validation(format!(
                    "item id {id} appears more than once"
                )));
            }
        }
    }
    Ok(())
}

/// Reserve `booking.slot_id` and record the booking with its items.
///
/// # Errors
///
/// `NotFound` if the slot (or user) does not exist or the slot was retired,
/// `Conflict` if the slot is already reserved.
pub fn create_booking<E: DbExecutor + ?Sized>(
    executor: &E,
    booking: &NewBooking,
) -> ReservationResult<Booking> {
    claim_slot(executor, booking.slot_id, booking.user_id)?;

    let row = executor
        .query_one(
            "INSERT INTO bookings (slot_id, user_id, start_time, end_time, note) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
            &[
                &booking.slot_id,
                &booking.user_id,
                &booking.start_time,
                &booking.end_time,
                &booking.note,
            ],
        )
        .map_err(|e| unknown_user(e, booking.user_id))?;
    let booking_id: i64 = column(&row, "id")?;

    let drafts: Vec<&ItemDraft> = booking.items.iter().collect();
    insert_items(executor, booking_id, &drafts)?;

    let created = require_booking(executor, booking_id)?;
    log::info!(
        "booking {} reserved slot {} for user {} ({} items)",
        created.id,
        created.slot_id,
        created.user_id,
        created.items.len()
    );
    #[cfg(feature = "metrics")]
    METRICS.record_booking("create");
    Ok(created)
}

/// Rewrite a booking's window, owner and slot, and upsert its items.
///
/// Items are matched by id: known ids are updated in place, everything else
/// is inserted. Items missing from `amendment.items` are kept. When the slot
/// changes, the new slot is claimed with the same compare-and-set as
/// [`create_booking`] and the old one is released.
///
/// # Errors
///
/// `NotFound` for an unknown booking, slot or user. `Conflict` if the booking
/// is already cleared or cancelled, the new slot is taken, or an item id
/// belongs to another booking.
pub fn update_booking<E: DbExecutor + ?Sized>(
    executor: &E,
    amendment: &BookingAmendment,
) -> ReservationResult<Booking> {
    let current = lock_booking(executor, amendment.booking_id)?;
    if !current.is_active() {
        return Err(ReservationError::conflict(format!(
            "booking {} is {:?} and can no longer change",
            current.id,
            current.state()
        )));
    }

    let moved = current.slot_id != amendment.slot_id;
    if moved {
        claim_slot(executor, amendment.slot_id, amendment.user_id)?;
    } else {
        executor.execute(
            "UPDATE slots SET is_disabled = TRUE, updated_by = $2, updated_at = NOW() \
             WHERE id = $1 AND NOT is_disabled",
            &[&amendment.slot_id, &amendment.user_id],
        )?;
    }

    executor
        .execute(
            "UPDATE bookings SET slot_id = $2, user_id = $3, start_time = $4, end_time = $5, \
             note = COALESCE($6, note), updated_at = NOW() WHERE id = $1",
            &[
                &amendment.booking_id,
                &amendment.slot_id,
                &amendment.user_id,
                &amendment.start_time,
                &amendment.end_time,
                &amendment.note,
            ],
        )
        .map_err(|e| unknown_user(e, amendment.user_id))?;

    if moved {
        release_slot_if_idle(executor, current.slot_id, amendment.user_id)?;
    }

    upsert_items(executor, amendment.booking_id, &amendment.items)?;

    let updated = require_booking(executor, amendment.booking_id)?;
    if moved {
        log::info!(
            "booking {} moved from slot {} to slot {}",
            updated.id,
            current.slot_id,
            updated.slot_id
        );
    } else {
        log::info!("booking {} updated", updated.id);
    }
    #[cfg(feature = "metrics")]
    METRICS.record_booking("update");
    Ok(updated)
}

/// Stamp the booking as cleared or cancelled by `actor` and free its slot.
///
/// Calling it again on a terminal booking re-stamps it with the new actor
/// and time but leaves the slot alone, since a later booking may hold it.
/// The stamp of the other action is reset so a booking never carries both.
///
/// # Errors
///
/// `NotFound` for an unknown booking, `Conflict` if `slot_id` is not the
/// booking's slot.
pub fn clear_or_cancel<E: DbExecutor + ?Sized>(
    executor: &E,
    booking_id: i64,
    slot_id: i64,
    actor: i64,
    action: BookingAction,
) -> ReservationResult<Booking> {
    let current = lock_booking(executor, booking_id)?;
    if current.slot_id != slot_id {
        return Err(ReservationError::conflict(format!(
            "booking {booking_id} is on slot {}, not slot {slot_id}",
            current.slot_id
        )));
    }

    let sql = match action {
        BookingAction::Clear => {
            "UPDATE bookings SET cleared_at = NOW(), cleared_by = $2, \
             cancelled_at = NULL, cancelled_by = NULL, updated_at = NOW() WHERE id = $1"
        }
        BookingAction::Cancel => {
            "UPDATE bookings SET cancelled_at = NOW(), cancelled_by = $2, \
             cleared_at = NULL, cleared_by = NULL, updated_at = NOW() WHERE id = $1"
        }
    };
    executor
        .execute(sql, &[&booking_id, &actor])
        .map_err(|e| unknown_user(e, actor))?;

    // A terminal booking gave up its slot already; it may belong to someone else now
    if current.is_active() {
        executor.execute(
            "UPDATE slots SET is_disabled = FALSE, updated_by = $2, updated_at = NOW() \
             WHERE id = $1",
            &[&slot_id, &actor],
        )?;
    }

    let terminated = require_booking(executor, booking_id)?;
    if current.is_active() {
        log::info!(
            "booking {booking_id} {:?} by user {actor}, slot {slot_id} freed",
            action.state()
        );
    } else {
        log::warn!(
            "booking {booking_id} was already {:?}, re-stamped as {:?} by user {actor}",
            current.state(),
            action.state()
        );
    }
    #[cfg(feature = "metrics")]
    METRICS.record_booking(action.as_str());
    Ok(terminated)
}

/// Read a booking with its items, ordered by item id.
///
/// # Errors
///
/// Returns `ReservationError::Storage` if a query fails.
pub fn load_booking<E: DbExecutor + ?Sized>(
    executor: &E,
    booking_id: i64,
) -> ReservationResult<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
    let Some(row) = find_optional_by_statement(executor, &sql, &[&booking_id])? else {
        return Ok(None);
    };
    let mut booking = Booking::from_row(&row)?;
    booking.items = load_items(executor, &[booking_id])?;
    Ok(Some(booking))
}

/// Items of all `booking_ids`, ordered by booking then item id.
pub(crate) fn load_items<E: DbExecutor + ?Sized>(
    executor: &E,
    booking_ids: &[i64],
) -> Result<Vec<Item>, DbError> {
    if booking_ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids = booking_ids.to_vec();
    find_all_by_statement(
        executor,
        "SELECT id, booking_id, name, quantity, note FROM booking_items \
         WHERE booking_id = ANY($1) ORDER BY booking_id, id",
        &[&ids],
    )?
    .iter()
    .map(Item::from_row)
    .collect()
}

fn require_booking<E: DbExecutor + ?Sized>(
    executor: &E,
    booking_id: i64,
) -> ReservationResult<Booking> {
    load_booking(executor, booking_id)?.ok_or(ReservationError::not_found("booking", booking_id))
}

fn lock_booking<E: DbExecutor + ?Sized>(
    executor: &E,
    booking_id: i64,
) -> ReservationResult<Booking> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
    let row = find_optional_by_statement(executor, &sql, &[&booking_id])?
        .ok_or(ReservationError::not_found("booking", booking_id))?;
    Ok(Booking::from_row(&row)?)
}

/// Flip a live slot from free to reserved, or explain why it could not be.
fn claim_slot<E: DbExecutor + ?Sized>(
    executor: &E,
    slot_id: i64,
    actor: i64,
) -> ReservationResult<()> {
    let claimed = executor.execute(
        "UPDATE slots SET is_disabled = TRUE, updated_by = $2, updated_at = NOW() \
         WHERE id = $1 AND is_disabled = FALSE AND retired_at IS NULL",
        &[&slot_id, &actor],
    )?;
    if claimed == 1 {
        return Ok(());
    }

    let live: Option<bool> = find_optional_by_statement(
        executor,
        "SELECT retired_at IS NULL AS live FROM slots WHERE id = $1",
        &[&slot_id],
    )?
    .map(|row| column(&row, "live"))
    .transpose()?;

    match live {
        Some(true) => {
            log::warn!("slot {slot_id} is already reserved");
            #[cfg(feature = "metrics")]
            METRICS.record_booking_conflict();
            Err(ReservationError::conflict(format!(
                "slot {slot_id} is already reserved"
            )))
        }
        Some(false) | None => Err(ReservationError::not_found("slot", slot_id)),
    }
}

fn release_slot_if_idle<E: DbExecutor + ?Sized>(
    executor: &E,
    slot_id: i64,
    actor: i64,
) -> ReservationResult<()> {
    executor.execute(
        "UPDATE slots SET is_disabled = FALSE, updated_by = $2, updated_at = NOW() \
         WHERE id = $1 AND NOT EXISTS (SELECT 1 FROM bookings b WHERE b.slot_id = $1 \
         AND b.cleared_at IS NULL AND b.cancelled_at IS NULL)",
        &[&slot_id, &actor],
    )?;
    Ok(())
}

fn upsert_items<E: DbExecutor + ?Sized>(
    executor: &E,
    booking_id: i64,
    incoming: &[ItemDraft],
) -> ReservationResult<()> {
    let persisted = find_all_by_statement(
        executor,
        "SELECT id FROM booking_items WHERE booking_id = $1",
        &[&booking_id],
    )?
    .iter()
    .map(|row| column::<i64>(row, "id"))
    .collect::<Result<Vec<_>, _>>()?;

    let plan = diff::plan(persisted, incoming)
        .map_err(|dup| ReservationError::validation(format!("item {dup}")))?;

    for stale in plan.stale_ids() {
        let exists: bool = query_value(
            executor,
            "SELECT EXISTS (SELECT 1 FROM booking_items WHERE id = $1)",
            &[&stale],
        )?;
        if exists {
            return Err(ReservationError::conflict(format!(
                "item {stale} does not belong to booking {booking_id}"
            )));
        }
    }

    for matched in &plan.updates {
        let item = matched.record;
        executor.execute(
            "UPDATE booking_items SET name = $3, quantity = $4, note = $5 \
             WHERE id = $1 AND booking_id = $2",
            &[&matched.id, &booking_id, &item.name.trim(), &item.quantity, &item.note],
        )?;
    }

    // Retirement candidates are left alone: items are never removed by an update
    let created: Vec<&ItemDraft> = plan.creates.iter().map(|c| c.record).collect();
    insert_items(executor, booking_id, &created)?;
    Ok(())
}

fn insert_items<E: DbExecutor + ?Sized>(
    executor: &E,
    booking_id: i64,
    items: &[&ItemDraft],
) -> ReservationResult<()> {
    if items.is_empty() {
        return Ok(());
    }
    let mut statement = Query::insert();
    statement
        .into_table("booking_items")
        .columns(["booking_id", "name", "quantity", "note"]);
    for item in items {
        statement
            .values([
                booking_id.into(),
                item.name.trim().to_string().into(),
                item.quantity.into(),
                item.note.clone().into(),
            ])
            .map_err(|e| DbError::Query(e.to_string()))?;
    }
    execute_built(executor, &statement)?;
    Ok(())
}

fn unknown_user(err: DbError, user_id: i64) -> ReservationError {
    match classify(&err) {
        ErrorClass::ForeignKeyViolation => ReservationError::not_found("user", user_id),
        _ => ReservationError::from(err),
    }
}
