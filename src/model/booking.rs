use super::{Keyed, RecordId};
use crate::executor::DbError;
use crate::raw_sql::column;
use chrono::{DateTime, Utc};
use may_postgres::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub booking_id: i64,
    pub name: String,
    pub quantity: i32,
    pub note: Option<String>,
}

impl Item {
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            booking_id: column(row, "booking_id")?,
            name: column(row, "name")?,
            quantity: column(row, "quantity")?,
            note: column(row, "note")?,
        })
    }
}

/// Where a booking stands. Cleared and cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingState {
    Active,
    Cleared,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub slot_id: i64,
    pub user_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub note: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<i64>,
    pub cleared_at: Option<DateTime<Utc>>,
    pub cleared_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<Item>,
}

impl Booking {
    /// Reads the `bookings` columns; items are attached by the caller.
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            slot_id: column(row, "slot_id")?,
            user_id: column(row, "user_id")?,
            start_time: column(row, "start_time")?,
            end_time: column(row, "end_time")?,
            note: column(row, "note")?,
            cancelled_at: column(row, "cancelled_at")?,
            cancelled_by: column(row, "cancelled_by")?,
            cleared_at: column(row, "cleared_at")?,
            cleared_by: column(row, "cleared_by")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
            items: Vec::new(),
        })
    }

    pub fn state(&self) -> BookingState {
        if self.cleared_at.is_some() {
            BookingState::Cleared
        } else if self.cancelled_at.is_some() {
            BookingState::Cancelled
        } else {
            BookingState::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == BookingState::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: i64,
    pub name: String,
}

/// Where a booked slot sits in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLabel {
    pub fridge_id: i64,
    pub fridge_name: String,
    pub shelf_id: i64,
    pub shelf_number: i32,
    pub shelf_name: String,
    pub slot_number: i32,
}

/// A booking as read projections return it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub state: BookingState,
    pub owner: Owner,
    pub slot: SlotLabel,
}

impl BookingView {
    /// Expects the `bookings` columns plus `owner_name`, `fridge_id`,
    /// `fridge_name`, `shelf_id`, `shelf_number`, `shelf_name`, `slot_number`.
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        let booking = Booking::from_row(row)?;
        Ok(Self {
            state: booking.state(),
            owner: Owner {
                id: booking.user_id,
                name: column(row, "owner_name")?,
            },
            slot: SlotLabel {
                fridge_id: column(row, "fridge_id")?,
                fridge_name: column(row, "fridge_name")?,
                shelf_id: column(row, "shelf_id")?,
                shelf_number: column(row, "shelf_number")?,
                shelf_name: column(row, "shelf_name")?,
                slot_number: column(row, "slot_number")?,
            },
            booking,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub name: String,
    pub quantity: i32,
    #[serde(default)]
    pub note: Option<String>,
}

impl ItemDraft {
    pub fn new(name: impl Into<String>, quantity: i32) -> Self {
        Self {
            id: None,
            name: name.into(),
            quantity,
            note: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(RecordId::Persisted(id));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl Keyed for ItemDraft {
    fn record_id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }
}

/// Input of `createBooking`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub slot_id: i64,
    pub user_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemDraft>,
}

/// Input of `updateBooking`. A `None` note keeps the stored one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingAmendment {
    pub booking_id: i64,
    pub slot_id: i64,
    pub user_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemDraft>,
}

/// How a booking is terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingAction {
    /// The owner took the items out
    Clear,
    /// The booking was called off
    Cancel,
}

impl BookingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingAction::Clear => "clear",
            BookingAction::Cancel => "cancel",
        }
    }

    pub(crate) fn state(self) -> BookingState {
        match self {
            BookingAction::Clear => BookingState::Cleared,
            BookingAction::Cancel => BookingState::Cancelled,
        }
    }
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown booking action `{}` (expected `clear` or `cancel`)", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl FromStr for BookingAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clear" => Ok(BookingAction::Clear),
            "cancel" => Ok(BookingAction::Cancel),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}
