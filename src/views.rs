//! Read projections. Nothing here writes.

use crate::error::{ReservationError, ReservationResult};
use crate::executor::DbExecutor;
use crate::hierarchy::{self, qualified, FRIDGE_COLUMNS, SHELF_COLUMNS, SLOT_COLUMNS};
use crate::ledger::{self, BOOKING_COLUMNS};
use crate::model::{BookingView, Fridge, FridgeDetail, FridgeSummary, Shelf, Slot};
use crate::raw_sql::find_all_by_statement;
use may_postgres::types::ToSql;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// What a caller may see beyond their own data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Read every user's bookings, not just one's own
    ViewAllBookings,
}

/// The already-authorized caller a read runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: i64,
    capabilities: HashSet<Capability>,
}

impl Viewer {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            capabilities: HashSet::new(),
        }
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Owner filter for booking lists; `None` means every owner.
    pub fn booking_owner_filter(&self) -> Option<i64> {
        if self.can(Capability::ViewAllBookings) {
            None
        } else {
            Some(self.user_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotNode {
    #[serde(flatten)]
    pub slot: Slot,
    /// Every booking the slot ever had, oldest start first
    pub bookings: Vec<BookingView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShelfNode {
    #[serde(flatten)]
    pub shelf: Shelf,
    pub slots: Vec<SlotNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FridgeNode {
    #[serde(flatten)]
    pub fridge: Fridge,
    pub shelves: Vec<ShelfNode>,
}

/// Fridges by name, each with live shelves and slots by number and the
/// bookings of every slot. `Some(id)` narrows the tree to one fridge.
///
/// # Errors
///
/// `NotFound` if `fridge_id` names no fridge.
pub fn list_fridge_tree<E: DbExecutor + ?Sized>(
    executor: &E,
    fridge_id: Option<i64>,
) -> ReservationResult<Vec<FridgeNode>> {
    let sql = format!(
        "SELECT {} FROM fridges f WHERE ($1::BIGINT IS NULL OR f.id = $1) ORDER BY f.name, f.id",
        qualified(FRIDGE_COLUMNS, "f")
    );
    let fridges = find_all_by_statement(executor, &sql, &[&fridge_id])?
        .iter()
        .map(Fridge::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    if let (Some(id), true) = (fridge_id, fridges.is_empty()) {
        return Err(ReservationError::not_found("fridge", id));
    }

    let sql = format!(
        "SELECT {} FROM shelves sh \
         WHERE sh.retired_at IS NULL AND ($1::BIGINT IS NULL OR sh.fridge_id = $1) \
         ORDER BY sh.shelf_number, sh.id",
        qualified(SHELF_COLUMNS, "sh")
    );
    let mut shelves: BTreeMap<i64, Vec<Shelf>> = BTreeMap::new();
    for row in find_all_by_statement(executor, &sql, &[&fridge_id])? {
        let shelf = Shelf::from_row(&row)?;
        shelves.entry(shelf.fridge_id).or_default().push(shelf);
    }

    let sql = format!(
        "SELECT {} FROM slots s JOIN shelves sh ON sh.id = s.shelf_id \
         WHERE s.retired_at IS NULL AND sh.retired_at IS NULL \
         AND ($1::BIGINT IS NULL OR sh.fridge_id = $1) \
         ORDER BY s.slot_number, s.id",
        qualified(SLOT_COLUMNS, "s")
    );
    let mut slots: BTreeMap<i64, Vec<Slot>> = BTreeMap::new();
    for row in find_all_by_statement(executor, &sql, &[&fridge_id])? {
        let slot = Slot::from_row(&row)?;
        slots.entry(slot.shelf_id).or_default().push(slot);
    }

    let mut bookings: BTreeMap<i64, Vec<BookingView>> = BTreeMap::new();
    for view in fetch_booking_views(
        executor,
        "($1::BIGINT IS NULL OR f.id = $1)",
        &[&fridge_id],
        "b.start_time, b.id",
    )? {
        bookings.entry(view.booking.slot_id).or_default().push(view);
    }

    let tree = fridges
        .into_iter()
        .map(|fridge| FridgeNode {
            shelves: shelves
                .remove(&fridge.id)
                .unwrap_or_default()
                .into_iter()
                .map(|shelf| ShelfNode {
                    slots: slots
                        .remove(&shelf.id)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|slot| SlotNode {
                            bookings: bookings.remove(&slot.id).unwrap_or_default(),
                            slot,
                        })
                        .collect(),
                    shelf,
                })
                .collect(),
            fridge,
        })
        .collect();
    Ok(tree)
}

/// One row per fridge with live shelf/slot counts, ordered by name.
///
/// # Errors
///
/// Returns `ReservationError::Storage` if the query fails.
pub fn list_fridges<E: DbExecutor + ?Sized>(executor: &E) -> ReservationResult<Vec<FridgeSummary>> {
    let rows = find_all_by_statement(
        executor,
        "SELECT f.id, f.name, f.location, f.description, f.updated_at, \
           (SELECT COUNT(*) FROM shelves sh \
             WHERE sh.fridge_id = f.id AND sh.retired_at IS NULL) AS shelf_count, \
           (SELECT COUNT(*) FROM slots s JOIN shelves sh ON sh.id = s.shelf_id \
             WHERE sh.fridge_id = f.id AND sh.retired_at IS NULL \
             AND s.retired_at IS NULL) AS slot_count, \
           (SELECT COUNT(*) FROM slots s JOIN shelves sh ON sh.id = s.shelf_id \
             WHERE sh.fridge_id = f.id AND sh.retired_at IS NULL \
             AND s.retired_at IS NULL AND NOT s.is_disabled) AS free_slot_count \
         FROM fridges f ORDER BY f.name, f.id",
        &[],
    )?;
    Ok(rows
        .iter()
        .map(FridgeSummary::from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

/// # Errors
///
/// `NotFound` for an unknown fridge.
pub fn get_fridge<E: DbExecutor + ?Sized>(
    executor: &E,
    fridge_id: i64,
) -> ReservationResult<FridgeDetail> {
    hierarchy::require_fridge(executor, fridge_id)
}

/// Bookings the viewer may see, newest start first.
///
/// # Errors
///
/// Returns `ReservationError::Storage` if the query fails.
pub fn list_bookings<E: DbExecutor + ?Sized>(
    executor: &E,
    viewer: &Viewer,
) -> ReservationResult<Vec<BookingView>> {
    let owner = viewer.booking_owner_filter();
    fetch_booking_views(
        executor,
        "($1::BIGINT IS NULL OR b.user_id = $1)",
        &[&owner],
        "b.start_time DESC, b.id DESC",
    )
}

/// A booking whose `end_time` has not passed yet.
///
/// # Errors
///
/// `NotFound` for an unknown or already ended booking.
pub fn get_booking<E: DbExecutor + ?Sized>(
    executor: &E,
    booking_id: i64,
) -> ReservationResult<BookingView> {
    fetch_booking_views(
        executor,
        "b.id = $1 AND b.end_time > NOW()",
        &[&booking_id],
        "b.id",
    )?
    .pop()
    .ok_or(ReservationError::not_found("booking", booking_id))
}

fn fetch_booking_views<E: DbExecutor + ?Sized>(
    executor: &E,
    filter: &str,
    params: &[&dyn ToSql],
    order_by: &str,
) -> ReservationResult<Vec<BookingView>> {
    let sql = format!(
        "SELECT {}, u.name AS owner_name, f.id AS fridge_id, f.name AS fridge_name, \
                sh.id AS shelf_id, sh.shelf_number, sh.shelf_name, s.slot_number \
         FROM bookings b \
         JOIN users u ON u.id = b.user_id \
         JOIN slots s ON s.id = b.slot_id \
         JOIN shelves sh ON sh.id = s.shelf_id \
         JOIN fridges f ON f.id = sh.fridge_id \
         WHERE {filter} ORDER BY {order_by}",
        qualified(BOOKING_COLUMNS, "b")
    );
    let mut views = find_all_by_statement(executor, &sql, params)?
        .iter()
        .map(BookingView::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let ids: Vec<i64> = views.iter().map(|v| v.booking.id).collect();
    let mut items: BTreeMap<i64, Vec<_>> = BTreeMap::new();
    for item in ledger::load_items(executor, &ids)? {
        items.entry(item.booking_id).or_default().push(item);
    }
    for view in &mut views {
        view.booking.items = items.remove(&view.booking.id).unwrap_or_default();
    }
    Ok(views)
}
