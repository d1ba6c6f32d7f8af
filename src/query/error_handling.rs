//! Error detection and classification utilities.
//!
//! The reservation core needs to tell a blocked delete or a duplicate name
//! apart from a generic failure, so driver errors are classified by SQLSTATE.

use crate::executor::DbError;
use may_postgres::error::SqlState;

/// Coarse classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A referencing row blocks the write (SQLSTATE 23503)
    ForeignKeyViolation,
    /// A unique constraint rejected the write (SQLSTATE 23505)
    UniqueViolation,
    /// A CHECK constraint rejected the write (SQLSTATE 23514)
    CheckViolation,
    /// The statement was canceled, usually by `statement_timeout` (SQLSTATE 57014)
    Canceled,
    /// Anything else
    Other,
}

/// Classify a storage error by its SQLSTATE.
pub fn classify(error: &DbError) -> ErrorClass {
    let DbError::Postgres(pg_error) = error else {
        return ErrorClass::Other;
    };
    match pg_error.code() {
        Some(code) => classify_state(code),
        None => ErrorClass::Other,
    }
}

fn classify_state(code: &SqlState) -> ErrorClass {
    if *code == SqlState::FOREIGN_KEY_VIOLATION {
        ErrorClass::ForeignKeyViolation
    } else if *code == SqlState::UNIQUE_VIOLATION {
        ErrorClass::UniqueViolation
    } else if *code == SqlState::CHECK_VIOLATION {
        ErrorClass::CheckViolation
    } else if *code == SqlState::QUERY_CANCELED {
        ErrorClass::Canceled
    } else {
        ErrorClass::Other
    }
}
