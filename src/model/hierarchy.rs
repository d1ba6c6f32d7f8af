use super::{Keyed, RecordId};
use crate::executor::DbError;
use crate::raw_sql::column;
use chrono::{DateTime, Utc};
use may_postgres::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl Audit {
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            created_by: column(row, "created_by")?,
            created_at: column(row, "created_at")?,
            updated_by: column(row, "updated_by")?,
            updated_at: column(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fridge {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub audit: Audit,
}

impl Fridge {
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            name: column(row, "name")?,
            location: column(row, "location")?,
            description: column(row, "description")?,
            audit: Audit::from_row(row)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shelf {
    pub id: i64,
    pub fridge_id: i64,
    pub shelf_number: i32,
    pub shelf_name: String,
    #[serde(flatten)]
    pub audit: Audit,
}

impl Shelf {
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            fridge_id: column(row, "fridge_id")?,
            shelf_number: column(row, "shelf_number")?,
            shelf_name: column(row, "shelf_name")?,
            audit: Audit::from_row(row)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: i64,
    pub shelf_id: i64,
    pub slot_number: i32,
    /// True while an active booking holds the slot.
    pub is_disabled: bool,
    #[serde(flatten)]
    pub audit: Audit,
}

impl Slot {
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            shelf_id: column(row, "shelf_id")?,
            slot_number: column(row, "slot_number")?,
            is_disabled: column(row, "is_disabled")?,
            audit: Audit::from_row(row)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfDetail {
    #[serde(flatten)]
    pub shelf: Shelf,
    pub slots: Vec<Slot>,
}

/// A fridge with its live shelves and slots, both ordered by their number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FridgeDetail {
    #[serde(flatten)]
    pub fridge: Fridge,
    pub shelves: Vec<ShelfDetail>,
}

impl FridgeDetail {
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.shelves.iter().flat_map(|shelf| shelf.slots.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FridgeSummary {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    pub shelf_count: i64,
    pub slot_count: i64,
    pub free_slot_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl FridgeSummary {
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            name: column(row, "name")?,
            location: column(row, "location")?,
            description: column(row, "description")?,
            shelf_count: column(row, "shelf_count")?,
            slot_count: column(row, "slot_count")?,
            free_slot_count: column(row, "free_slot_count")?,
            updated_at: column(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDraft {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub slot_number: i32,
}

impl SlotDraft {
    pub fn new(slot_number: i32) -> Self {
        Self {
            id: None,
            slot_number,
        }
    }

    pub fn existing(id: i64, slot_number: i32) -> Self {
        Self {
            id: Some(RecordId::Persisted(id)),
            slot_number,
        }
    }
}

impl Keyed for SlotDraft {
    fn record_id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfDraft {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub shelf_number: i32,
    pub shelf_name: String,
    #[serde(default)]
    pub slots: Vec<SlotDraft>,
}

impl ShelfDraft {
    pub fn new(shelf_number: i32, shelf_name: impl Into<String>, slots: Vec<SlotDraft>) -> Self {
        Self {
            id: None,
            shelf_number,
            shelf_name: shelf_name.into(),
            slots,
        }
    }

    /// Mirror a loaded shelf back as an edit, keeping every id.
    pub fn from_detail(detail: &ShelfDetail) -> Self {
        Self {
            id: Some(RecordId::Persisted(detail.shelf.id)),
            shelf_number: detail.shelf.shelf_number,
            shelf_name: detail.shelf.shelf_name.clone(),
            slots: detail
                .slots
                .iter()
                .map(|slot| SlotDraft::existing(slot.id, slot.slot_number))
                .collect(),
        }
    }
}

impl Keyed for ShelfDraft {
    fn record_id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }
}

/// Input of `createFridge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FridgeDraft {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
    pub shelves: Vec<ShelfDraft>,
}

/// Input of `updateFridge`; `shelves: None` leaves the tree untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FridgeEdit {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub shelves: Option<Vec<ShelfDraft>>,
}

impl FridgeEdit {
    /// An edit that resubmits `detail` exactly as loaded.
    pub fn from_detail(detail: &FridgeDetail) -> Self {
        Self {
            name: detail.fridge.name.clone(),
            location: detail.fridge.location.clone(),
            description: detail.fridge.description.clone(),
            shelves: Some(detail.shelves.iter().map(ShelfDraft::from_detail).collect()),
        }
    }
}
