//! Row types of the reservation schema and the drafts callers submit.
//!
//! `Fridge → Shelf → Slot` is the containment tree; a `Booking` hangs off a
//! slot and owns its `Item` lines. Every row type knows how to read itself
//! from a `may_postgres::Row` whose columns carry the table's own names.

pub mod booking;
pub mod hierarchy;

pub use booking::{
    Booking, BookingAction, BookingAmendment, BookingState, BookingView, Item, ItemDraft,
    NewBooking, Owner, SlotLabel,
};
pub use hierarchy::{
    Audit, Fridge, FridgeDetail, FridgeDraft, FridgeEdit, FridgeSummary, Shelf, ShelfDetail,
    ShelfDraft, Slot, SlotDraft,
};

use serde::{Deserialize, Serialize};

/// Identity carried by an incoming record.
///
/// Edit forms send the numeric id of rows they loaded and invent string ids
/// (`"new-3"`) for rows the user just added; both arrive in the same field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Persisted(i64),
    Draft(String),
}

impl RecordId {
    pub fn persisted(&self) -> Option<i64> {
        match self {
            RecordId::Persisted(id) => Some(*id),
            RecordId::Draft(_) => None,
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Persisted(id)
    }
}

/// An incoming record that may name a persisted row.
pub trait Keyed {
    fn record_id(&self) -> Option<&RecordId>;

    fn persisted_id(&self) -> Option<i64> {
        self.record_id().and_then(RecordId::persisted)
    }
}
