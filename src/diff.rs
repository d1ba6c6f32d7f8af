//! Diff-by-identity between persisted rows and an incoming list.
//!
//! [`plan`] partitions an incoming list against the ids currently stored under
//! one parent into three disjoint outputs:
//!
//! - **updates**: incoming records whose numeric id is one of the persisted ids
//! - **creates**: records without an id, with a draft id, or with a numeric id
//!   that is not among the persisted ids (kept as `stale_id` so the caller can
//!   decide whether that id belongs to some other parent)
//! - **retirements**: persisted ids no incoming record matched
//!
//! The function is pure; the hierarchy store and the booking ledger apply the
//! plan inside their own transactions.

use crate::model::Keyed;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub struct Matched<'a, T> {
    pub id: i64,
    pub record: &'a T,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Unmatched<'a, T> {
    /// Numeric id the record carried although no persisted row has it
    pub stale_id: Option<i64>,
    pub record: &'a T,
}

#[derive(Debug, PartialEq, Eq)]
pub struct SyncPlan<'a, T> {
    pub updates: Vec<Matched<'a, T>>,
    pub creates: Vec<Unmatched<'a, T>>,
    /// Ascending.
    pub retirements: Vec<i64>,
}

impl<T> SyncPlan<'_, T> {
    /// Numeric ids that matched nothing under this parent.
    pub fn stale_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.creates.iter().filter_map(|c| c.stale_id)
    }

    pub fn is_noop(&self) -> bool {
        self.creates.is_empty() && self.retirements.is_empty()
    }
}

/// The same persisted id appeared twice in one incoming list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateId(pub i64);

impl fmt::Display for DuplicateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id {} appears more than once", self.0)
    }
}

impl std::error::Error for DuplicateId {}

pub fn plan<'a, T, I>(persisted: I, incoming: &'a [T]) -> Result<SyncPlan<'a, T>, DuplicateId>
where
    T: Keyed,
    I: IntoIterator<Item = i64>,
{
    let persisted: BTreeSet<i64> = persisted.into_iter().collect();
    let mut matched = BTreeSet::new();
    let mut updates = Vec::new();
    let mut creates = Vec::new();

    for record in incoming {
        match record.persisted_id() {
            Some(id) if persisted.contains(&id) => {
                if !matched.insert(id) {
                    return Err(DuplicateId(id));
                }
                updates.push(Matched { id, record });
            }
            stale_id => creates.push(Unmatched { stale_id, record }),
        }
    }

    let retirements = persisted.difference(&matched).copied().collect();

    Ok(SyncPlan {
        updates,
        creates,
        retirements,
    })
}
