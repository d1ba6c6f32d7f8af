//! Error taxonomy of the reservation core.

use crate::executor::DbError;
use crate::pool::PoolError;
use crate::query::{classify, ErrorClass};
use crate::transaction::TransactionError;
use std::fmt;

#[derive(Debug)]
pub enum ReservationError {
    /// Missing or invalid input; raised before any transaction opens
    Validation(String),
    /// The referenced fridge/shelf/slot/booking does not exist
    NotFound { entity: &'static str, id: i64 },
    /// The write would break an invariant or is blocked by a referencing row
    Conflict(String),
    /// The underlying transaction failed
    Storage(DbError),
}

pub type ReservationResult<T> = Result<T, ReservationError>;

impl ReservationError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReservationError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ReservationError::Conflict(message.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        ReservationError::NotFound { entity, id }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ReservationError::Conflict(_))
    }
}

impl fmt::Display for ReservationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationError::Validation(msg) => write!(f, "validation failed: {msg}"),
            ReservationError::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            ReservationError::Conflict(msg) => write!(f, "conflict: {msg}"),
            ReservationError::Storage(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for ReservationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReservationError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for ReservationError {
    fn from(err: DbError) -> Self {
        match classify(&err) {
            ErrorClass::ForeignKeyViolation => {
                ReservationError::Conflict(format!("still referenced by other rows: {err}"))
            }
            ErrorClass::UniqueViolation => {
                ReservationError::Conflict(format!("duplicate value: {err}"))
            }
            ErrorClass::CheckViolation | ErrorClass::Canceled | ErrorClass::Other => {
                ReservationError::Storage(err)
            }
        }
    }
}

impl From<TransactionError> for ReservationError {
    fn from(err: TransactionError) -> Self {
        ReservationError::Storage(err.into())
    }
}

impl From<PoolError> for ReservationError {
    fn from(err: PoolError) -> Self {
        ReservationError::Storage(DbError::Other(err.to_string()))
    }
}
