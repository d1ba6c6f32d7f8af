//! Hierarchy store: the `Fridge → Shelf → Slot` tree and its synchronizer.
//!
//! Writes take any [`DbExecutor`], normally the open [`Transaction`] handed out
//! by [`Larder::in_transaction`](crate::service::Larder::in_transaction), so a
//! whole tree edit commits or rolls back as one unit. Inputs are expected to
//! have passed [`validate_draft`] / [`validate_edit`] before the transaction
//! was opened.
//!
//! Retirement is soft. A retired shelf or slot keeps its row (bookings still
//! point at it) but drops out of every read.
//!
//! [`Transaction`]: crate::transaction::Transaction

use crate::diff;
use crate::error::{ReservationError, ReservationResult};
use crate::executor::{DbError, DbExecutor};
use crate::model::{
    Fridge, FridgeDetail, FridgeDraft, FridgeEdit, Keyed, Shelf, ShelfDetail, ShelfDraft, Slot,
    SlotDraft,
};
use crate::query::{classify, ErrorClass};
use crate::raw_sql::{
    column, execute_built, find_all_by_statement, find_optional_by_statement, query_value,
};
use sea_query::{Expr, ExprTrait, Query};
use std::collections::{BTreeMap, HashSet};

pub(crate) const FRIDGE_COLUMNS: &str =
    "id, name, location, description, created_by, created_at, updated_by, updated_at";
pub(crate) const SHELF_COLUMNS: &str =
    "id, fridge_id, shelf_number, shelf_name, created_by, created_at, updated_by, updated_at";
pub(crate) const SLOT_COLUMNS: &str =
    "id, shelf_id, slot_number, is_disabled, created_by, created_at, updated_by, updated_at";

/// Check a new fridge before any transaction opens.
///
/// # Errors
///
/// Returns `ReservationError::Validation` naming the first offending field.
pub fn validate_draft(draft: &FridgeDraft) -> ReservationResult<()> {
    validate_fields(&draft.name, &draft.location)?;
    validate_shelves(&draft.shelves)
}

/// Check a fridge edit before any transaction opens.
///
/// # Errors
///
/// Returns `ReservationError::Validation` naming the first offending field.
pub fn validate_edit(edit: &FridgeEdit) -> ReservationResult<()> {
    validate_fields(&edit.name, &edit.location)?;
    match &edit.shelves {
        Some(shelves) => validate_shelves(shelves),
        None => Ok(()),
    }
}

fn validate_fields(name: &str, location: &str) -> ReservationResult<()> {
    if name.trim().is_empty() {
        return Err(ReservationError::validation("fridge name is required"));
    }
    if location.trim().is_empty() {
        return Err(ReservationError::validation("fridge location is required"));
    }
    Ok(())
}

fn validate_shelves(shelves: &[ShelfDraft]) -> ReservationResult<()> {
    if shelves.is_empty() {
        return Err(ReservationError::validation("at least one shelf is required"));
    }

    let mut shelf_ids = HashSet::new();
    let mut slot_ids = HashSet::new();
    for shelf in shelves {
        if shelf.shelf_name.trim().is_empty() {
            return Err(ReservationError::validation(format!(
                "shelf {} needs a name",
                shelf.shelf_number
            )));
        }
        if shelf.slots.is_empty() {
            return Err(ReservationError::validation(format!(
                "shelf {} ('{}') needs at least one slot",
                shelf.shelf_number, shelf.shelf_name
            )));
        }
        if let Some(id) = shelf.persisted_id() {
            if !shelf_ids.insert(id) {
                return Err(ReservationError::validation(format!(
                    "shelf id {id} appears more than once"
                )));
            }
        }
        for id in shelf.slots.iter().filter_map(SlotDraft::persisted_id) {
            if !slot_ids.insert(id) {
                return Err(ReservationError::validation(format!(
                    "slot id {id} appears more than once"
                )));
            }
        }
    }
    Ok(())
}

/// Insert a fridge and its whole shelf/slot tree.
///
/// # Errors
///
/// `Conflict` if the name is taken or a submitted id belongs to another
/// fridge, `Storage` for anything else the database rejects.
pub fn create_fridge<E: DbExecutor + ?Sized>(
    executor: &E,
    actor: i64,
    draft: &FridgeDraft,
) -> ReservationResult<FridgeDetail> {
    let row = executor
        .query_one(
            "INSERT INTO fridges (name, location, description, created_by) \
             VALUES ($1, $2, $3, $4) RETURNING id",
            &[&draft.name.trim(), &draft.location.trim(), &draft.description, &actor],
        )
        .map_err(|e| name_taken(e, &draft.name))?;
    let fridge_id: i64 = column(&row, "id")?;

    sync_shelves(executor, actor, fridge_id, &draft.shelves)?;

    let detail = require_fridge(executor, fridge_id)?;
    log::info!(
        "created fridge {} '{}' with {} shelves / {} slots",
        fridge_id,
        detail.fridge.name,
        detail.shelves.len(),
        detail.slots().count()
    );
    Ok(detail)
}

/// Update fridge fields and, when `edit.shelves` is present, synchronize the
/// shelf/slot tree against it.
///
/// The fridge row is locked for the rest of the transaction. When the tree is
/// synchronized, its live shelves are locked too, along with the slots of
/// every shelf that is kept or retired. A booking racing the edit for one of
/// those slots either commits first, so the retirement sees it and gives
/// `Conflict`, or waits and then finds the slot retired.
///
/// # Errors
///
/// `NotFound` for an unknown fridge; `Conflict` for a taken name, a foreign
/// shelf/slot id, or a retirement that would drop a reserved slot.
pub fn update_fridge<E: DbExecutor + ?Sized>(
    executor: &E,
    actor: i64,
    fridge_id: i64,
    edit: &FridgeEdit,
) -> ReservationResult<FridgeDetail> {
    lock_fridge(executor, fridge_id)?;

    executor
        .execute(
            "UPDATE fridges SET name = $2, location = $3, description = $4, \
             updated_by = $5, updated_at = NOW() WHERE id = $1",
            &[
                &fridge_id,
                &edit.name.trim(),
                &edit.location.trim(),
                &edit.description,
                &actor,
            ],
        )
        .map_err(|e| name_taken(e, &edit.name))?;

    if let Some(shelves) = &edit.shelves {
        sync_shelves(executor, actor, fridge_id, shelves)?;
    }

    let detail = require_fridge(executor, fridge_id)?;
    log::info!("updated fridge {} '{}'", fridge_id, detail.fridge.name);
    Ok(detail)
}

/// Hard-delete a fridge with its shelves and slots.
///
/// Any booking row, active or historic, still pointing at one of its slots
/// blocks the delete through the foreign key.
///
/// # Errors
///
/// `NotFound` for an unknown fridge, `Conflict` when bookings reference it.
pub fn delete_fridge<E: DbExecutor + ?Sized>(
    executor: &E,
    fridge_id: i64,
) -> ReservationResult<()> {
    lock_fridge(executor, fridge_id)?;

    let blocked = |e: DbError| match classify(&e) {
        ErrorClass::ForeignKeyViolation => ReservationError::conflict(format!(
            "fridge {fridge_id} still has bookings on its slots"
        )),
        _ => ReservationError::from(e),
    };

    let slots = executor
        .execute(
            "DELETE FROM slots WHERE shelf_id IN (SELECT id FROM shelves WHERE fridge_id = $1)",
            &[&fridge_id],
        )
        .map_err(blocked)?;
    let shelves = executor
        .execute("DELETE FROM shelves WHERE fridge_id = $1", &[&fridge_id])
        .map_err(blocked)?;
    executor
        .execute("DELETE FROM fridges WHERE id = $1", &[&fridge_id])
        .map_err(blocked)?;

    log::info!("deleted fridge {fridge_id} ({shelves} shelves, {slots} slots)");
    Ok(())
}

/// Read one fridge with its live shelves and slots, ordered by number.
///
/// # Errors
///
/// Returns `ReservationError::Storage` if a query fails.
pub fn load_fridge<E: DbExecutor + ?Sized>(
    executor: &E,
    fridge_id: i64,
) -> ReservationResult<Option<FridgeDetail>> {
    let sql = format!("SELECT {FRIDGE_COLUMNS} FROM fridges WHERE id = $1");
    let Some(row) = find_optional_by_statement(executor, &sql, &[&fridge_id])? else {
        return Ok(None);
    };
    let fridge = Fridge::from_row(&row)?;

    let sql = format!(
        "SELECT {SHELF_COLUMNS} FROM shelves \
         WHERE fridge_id = $1 AND retired_at IS NULL ORDER BY shelf_number, id"
    );
    let shelves = find_all_by_statement(executor, &sql, &[&fridge_id])?
        .iter()
        .map(Shelf::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let sql = format!(
        "SELECT {} FROM slots s JOIN shelves sh ON sh.id = s.shelf_id \
         WHERE sh.fridge_id = $1 AND sh.retired_at IS NULL AND s.retired_at IS NULL \
         ORDER BY s.slot_number, s.id",
        qualified(SLOT_COLUMNS, "s")
    );
    let mut slots_by_shelf: BTreeMap<i64, Vec<Slot>> = BTreeMap::new();
    for row in find_all_by_statement(executor, &sql, &[&fridge_id])? {
        let slot = Slot::from_row(&row)?;
        slots_by_shelf.entry(slot.shelf_id).or_default().push(slot);
    }

    let shelves = shelves
        .into_iter()
        .map(|shelf| ShelfDetail {
            slots: slots_by_shelf.remove(&shelf.id).unwrap_or_default(),
            shelf,
        })
        .collect();

    Ok(Some(FridgeDetail { fridge, shelves }))
}

pub(crate) fn require_fridge<E: DbExecutor + ?Sized>(
    executor: &E,
    fridge_id: i64,
) -> ReservationResult<FridgeDetail> {
    load_fridge(executor, fridge_id)?.ok_or(ReservationError::not_found("fridge", fridge_id))
}

/// `a, b` → `s.a, s.b`
pub(crate) fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(", ")
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn lock_fridge<E: DbExecutor + ?Sized>(executor: &E, fridge_id: i64) -> ReservationResult<()> {
    find_optional_by_statement(
        executor,
        "SELECT id FROM fridges WHERE id = $1 FOR UPDATE",
        &[&fridge_id],
    )?
    .map(|_| ())
    .ok_or(ReservationError::not_found("fridge", fridge_id))
}

fn name_taken(err: DbError, name: &str) -> ReservationError {
    match classify(&err) {
        ErrorClass::UniqueViolation => {
            ReservationError::conflict(format!("a fridge named '{}' already exists", name.trim()))
        }
        _ => ReservationError::from(err),
    }
}

/// A numeric id that matched nothing under this parent but exists elsewhere
/// (another fridge, another shelf, or already retired) is never reused.
fn reject_foreign_ids<E: DbExecutor + ?Sized>(
    executor: &E,
    table: &str,
    entity: &str,
    parent: &str,
    ids: impl Iterator<Item = i64>,
) -> ReservationResult<()> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
    for id in ids {
        let exists: bool = query_value(executor, &sql, &[&id])?;
        if exists {
            return Err(ReservationError::conflict(format!(
                "{entity} {id} does not belong to {parent}"
            )));
        }
    }
    Ok(())
}

fn sync_shelves<E: DbExecutor + ?Sized>(
    executor: &E,
    actor: i64,
    fridge_id: i64,
    incoming: &[ShelfDraft],
) -> ReservationResult<()> {
    let persisted = find_all_by_statement(
        executor,
        "SELECT id, shelf_number, shelf_name FROM shelves \
         WHERE fridge_id = $1 AND retired_at IS NULL FOR UPDATE",
        &[&fridge_id],
    )?;
    let mut labels = BTreeMap::new();
    for row in &persisted {
        let id: i64 = column(row, "id")?;
        let number: i32 = column(row, "shelf_number")?;
        let name: String = column(row, "shelf_name")?;
        labels.insert(id, format!("shelf {number} ('{name}')"));
    }

    let plan = diff::plan(labels.keys().copied(), incoming)
        .map_err(|dup| ReservationError::validation(format!("shelf {dup}")))?;
    log::debug!(
        "fridge {fridge_id} shelf plan: {} update, {} create, {} retire",
        plan.updates.len(),
        plan.creates.len(),
        plan.retirements.len()
    );

    reject_foreign_ids(
        executor,
        "shelves",
        "shelf",
        &format!("fridge {fridge_id}"),
        plan.stale_ids(),
    )?;

    // Retire first so a reserved slot aborts before anything else is written
    if !plan.retirements.is_empty() {
        if let Some((shelf_id, slot_number)) = lock_shelf_slots(executor, &plan.retirements)? {
            return Err(ReservationError::conflict(format!(
                "{} still holds reserved slot {slot_number}",
                labels.get(&shelf_id).map_or("shelf", String::as_str)
            )));
        }
        retire(executor, "slots", "shelf_id", plan.retirements.clone(), actor)?;
        retire(executor, "shelves", "id", plan.retirements.clone(), actor)?;
    }

    for matched in &plan.updates {
        let shelf = matched.record;
        executor.execute(
            "UPDATE shelves SET shelf_number = $2, shelf_name = $3, \
             updated_by = $4, updated_at = NOW() WHERE id = $1",
            &[&matched.id, &shelf.shelf_number, &shelf.shelf_name.trim(), &actor],
        )?;
        sync_slots(executor, actor, matched.id, &shelf.slots)?;
    }

    for unmatched in &plan.creates {
        let shelf = unmatched.record;
        let row = executor.query_one(
            "INSERT INTO shelves (fridge_id, shelf_number, shelf_name, created_by) \
             VALUES ($1, $2, $3, $4) RETURNING id",
            &[&fridge_id, &shelf.shelf_number, &shelf.shelf_name.trim(), &actor],
        )?;
        let shelf_id: i64 = column(&row, "id")?;
        sync_slots(executor, actor, shelf_id, &shelf.slots)?;
    }

    Ok(())
}

fn sync_slots<E: DbExecutor + ?Sized>(
    executor: &E,
    actor: i64,
    shelf_id: i64,
    incoming: &[SlotDraft],
) -> ReservationResult<()> {
    let persisted = find_all_by_statement(
        executor,
        "SELECT id, slot_number, is_disabled FROM slots \
         WHERE shelf_id = $1 AND retired_at IS NULL FOR UPDATE",
        &[&shelf_id],
    )?;
    let mut reserved = BTreeMap::new();
    for row in &persisted {
        let id: i64 = column(row, "id")?;
        let number: i32 = column(row, "slot_number")?;
        let is_disabled: bool = column(row, "is_disabled")?;
        reserved.insert(id, is_disabled.then_some(number));
    }

    let plan = diff::plan(reserved.keys().copied(), incoming)
        .map_err(|dup| ReservationError::validation(format!("slot {dup}")))?;

    reject_foreign_ids(
        executor,
        "slots",
        "slot",
        &format!("shelf {shelf_id}"),
        plan.stale_ids(),
    )?;

    if let Some(slot_number) = plan
        .retirements
        .iter()
        .find_map(|id| reserved.get(id).copied().flatten())
    {
        return Err(ReservationError::conflict(format!(
            "slot {slot_number} on shelf {shelf_id} is reserved and cannot be removed"
        )));
    }
    if !plan.retirements.is_empty() {
        retire(executor, "slots", "id", plan.retirements.clone(), actor)?;
    }

    for matched in &plan.updates {
        executor.execute(
            "UPDATE slots SET slot_number = $2, updated_by = $3, updated_at = NOW() WHERE id = $1",
            &[&matched.id, &matched.record.slot_number, &actor],
        )?;
    }

    for unmatched in &plan.creates {
        executor.execute(
            "INSERT INTO slots (shelf_id, slot_number, created_by) VALUES ($1, $2, $3)",
            &[&shelf_id, &unmatched.record.slot_number, &actor],
        )?;
    }

    Ok(())
}

/// Lock every live slot on `shelf_ids` and return the first reserved one as
/// `(shelf_id, slot_number)`.
///
/// The row locks are held until the transaction ends, so a booking that
/// tries to claim one of these slots waits, then finds it retired.
fn lock_shelf_slots<E: DbExecutor + ?Sized>(
    executor: &E,
    shelf_ids: &[i64],
) -> ReservationResult<Option<(i64, i32)>> {
    let ids = shelf_ids.to_vec();
    let rows = find_all_by_statement(
        executor,
        "SELECT shelf_id, slot_number, is_disabled FROM slots \
         WHERE shelf_id = ANY($1) AND retired_at IS NULL \
         ORDER BY shelf_id, slot_number, id FOR UPDATE",
        &[&ids],
    )?;
    for row in &rows {
        let is_disabled: bool = column(row, "is_disabled")?;
        if is_disabled {
            return Ok(Some((column(row, "shelf_id")?, column(row, "slot_number")?)));
        }
    }
    Ok(None)
}

/// Soft-retire every live row of `table` whose `key` is in `ids`.
fn retire<E: DbExecutor + ?Sized>(
    executor: &E,
    table: &'static str,
    key: &'static str,
    ids: Vec<i64>,
    actor: i64,
) -> ReservationResult<u64> {
    let statement = Query::update()
        .table(table)
        .value("retired_at", Expr::cust("NOW()"))
        .value("retired_by", actor)
        .value("updated_at", Expr::cust("NOW()"))
        .value("updated_by", actor)
        .and_where(Expr::col(key).is_in(ids))
        .and_where(Expr::col("retired_at").is_null())
        .to_owned();
    Ok(execute_built(executor, &statement)?)
}
