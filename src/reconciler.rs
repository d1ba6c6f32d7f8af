//! Availability sweep.
//!
//! Bookings flip `slots.is_disabled` when they are written, but nothing else
//! does, so a missed free (or a hand-edited row) leaves a slot out of step
//! with its bookings. The sweep reads every live slot with the clear/cancel
//! stamps of its bookings, plans the corrections, and applies them in two
//! batched updates. Each update re-checks the active-booking predicate in SQL,
//! so a booking written between the read and the write is never overridden.
//!
//! `end_time` is not consulted: a booking nobody cleared keeps its slot
//! reserved after it expires.

use crate::error::ReservationResult;
use crate::executor::DbExecutor;
use crate::raw_sql::{column, find_all_by_statement, query_built};
use chrono::{DateTime, Utc};
use sea_query::{Expr, ExprTrait, Query};
use serde::Serialize;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

const ACTIVE_BOOKING: &str = "EXISTS (SELECT 1 FROM bookings b WHERE b.slot_id = slots.id \
     AND b.cleared_at IS NULL AND b.cancelled_at IS NULL)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingStamp {
    pub id: i64,
    pub cleared_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl BookingStamp {
    pub fn is_active(&self) -> bool {
        self.cleared_at.is_none() && self.cancelled_at.is_none()
    }
}

/// One live slot as the sweep sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOccupancy {
    pub slot_id: i64,
    pub is_disabled: bool,
    pub bookings: Vec<BookingStamp>,
}

impl SlotOccupancy {
    pub fn has_active_booking(&self) -> bool {
        self.bookings.iter().any(BookingStamp::is_active)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepPlan {
    /// Disabled slots with no active booking
    pub release: Vec<i64>,
    /// Free slots that do have an active booking
    pub reserve: Vec<i64>,
}

impl SweepPlan {
    pub fn is_empty(&self) -> bool {
        self.release.is_empty() && self.reserve.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub released: Vec<i64>,
    pub reserved: Vec<i64>,
}

pub fn plan_sweep(slots: &[SlotOccupancy]) -> SweepPlan {
    let mut plan = SweepPlan::default();
    for slot in slots {
        match (slot.is_disabled, slot.has_active_booking()) {
            (true, false) => plan.release.push(slot.slot_id),
            (false, true) => plan.reserve.push(slot.slot_id),
            _ => {}
        }
    }
    plan
}

/// Every live slot, fridge by fridge, with its bookings' stamps.
///
/// # Errors
///
/// Returns `ReservationError::Storage` if the read fails.
pub fn read_occupancy<E: DbExecutor + ?Sized>(
    executor: &E,
) -> ReservationResult<Vec<SlotOccupancy>> {
    let rows = find_all_by_statement(
        executor,
        "SELECT s.id AS slot_id, s.is_disabled, \
                b.id AS booking_id, b.cleared_at, b.cancelled_at \
         FROM fridges f \
         JOIN shelves sh ON sh.fridge_id = f.id AND sh.retired_at IS NULL \
         JOIN slots s ON s.shelf_id = sh.id AND s.retired_at IS NULL \
         LEFT JOIN bookings b ON b.slot_id = s.id \
         ORDER BY f.id, sh.shelf_number, sh.id, s.slot_number, s.id, b.id",
        &[],
    )?;

    let mut slots: Vec<SlotOccupancy> = Vec::new();
    for row in &rows {
        let slot_id: i64 = column(row, "slot_id")?;
        if slots.last().map(|s| s.slot_id) != Some(slot_id) {
            slots.push(SlotOccupancy {
                slot_id,
                is_disabled: column(row, "is_disabled")?,
                bookings: Vec::new(),
            });
        }
        let booking_id: Option<i64> = column(row, "booking_id")?;
        if let (Some(id), Some(slot)) = (booking_id, slots.last_mut()) {
            slot.bookings.push(BookingStamp {
                id,
                cleared_at: column(row, "cleared_at")?,
                cancelled_at: column(row, "cancelled_at")?,
            });
        }
    }
    Ok(slots)
}

/// Run one sweep on `executor`; commit is the caller's.
///
/// # Errors
///
/// Returns `ReservationError::Storage` if a read or either batch fails.
pub fn sweep<E: DbExecutor + ?Sized>(executor: &E) -> ReservationResult<SweepReport> {
    let slots = read_occupancy(executor)?;
    let plan = plan_sweep(&slots);
    log::debug!(
        "sweep plan over {} slots: release {:?}, reserve {:?}",
        slots.len(),
        plan.release,
        plan.reserve
    );

    let released = apply(executor, &plan.release, false)?;
    let reserved = apply(executor, &plan.reserve, true)?;

    if released.is_empty() && reserved.is_empty() {
        log::info!("sweep checked {} slots, nothing to repair", slots.len());
    } else {
        log::info!(
            "sweep checked {} slots: released {:?}, reserved {:?}",
            slots.len(),
            released,
            reserved
        );
    }
    if released.len() != plan.release.len() || reserved.len() != plan.reserve.len() {
        log::warn!("sweep skipped slots whose bookings changed since they were read");
    }
    #[cfg(feature = "metrics")]
    METRICS.record_sweep(released.len(), reserved.len());

    Ok(SweepReport {
        scanned: slots.len(),
        released,
        reserved,
    })
}

/// Set `is_disabled = disable` on every slot in `ids` that still needs it.
fn apply<E: DbExecutor + ?Sized>(
    executor: &E,
    ids: &[i64],
    disable: bool,
) -> ReservationResult<Vec<i64>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let guard = if disable {
        ACTIVE_BOOKING.to_string()
    } else {
        format!("NOT {ACTIVE_BOOKING}")
    };
    let statement = Query::update()
        .table("slots")
        .value("is_disabled", disable)
        .value("updated_at", Expr::cust("NOW()"))
        .and_where(Expr::col("id").is_in(ids.iter().copied()))
        .and_where(Expr::col("is_disabled").eq(!disable))
        .and_where(Expr::cust(guard))
        .returning_col("id")
        .to_owned();

    let mut changed = query_built(executor, &statement)?
        .iter()
        .map(|row| column::<i64>(row, "id"))
        .collect::<Result<Vec<_>, _>>()?;
    changed.sort_unstable();
    Ok(changed)
}
