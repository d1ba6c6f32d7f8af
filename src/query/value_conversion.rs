//! Value conversion utilities for SeaQuery to may_postgres.
//!
//! The conversion follows a two-pass pattern:
//! 1. First pass: collect all values into typed vectors
//! 2. Second pass: create references to the stored values
//!
//! so the references stay valid for the duration of the closure.
//!
//! NULLs keep their column type (`Option<bool>`, `Option<i32>`, ...): the
//! driver checks a parameter's Rust type against the column it is bound to.

use crate::executor::DbError;
use may_postgres::types::ToSql;
use sea_query::Value;

/// Convert SeaQuery values to may_postgres ToSql parameters and run `f` with them.
///
/// # Errors
///
/// Returns `DbError::Other` if an unsupported value type is encountered.
pub fn with_converted_params<F, R>(values: &sea_query::Values, f: F) -> Result<R, DbError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, DbError>,
{
    let mut bools: Vec<Option<bool>> = Vec::new();
    let mut ints: Vec<Option<i32>> = Vec::new();
    let mut big_ints: Vec<Option<i64>> = Vec::new();
    let mut strings: Vec<Option<String>> = Vec::new();

    // First pass: collect all values into typed vectors
    for value in values.iter() {
        match value {
            Value::Bool(b) => bools.push(*b),
            Value::TinyInt(i) => ints.push(i.map(i32::from)),
            Value::SmallInt(i) => ints.push(i.map(i32::from)),
            Value::Int(i) => ints.push(*i),
            Value::BigInt(i) => big_ints.push(*i),
            Value::String(s) => strings.push(s.as_ref().map(|s| s.to_string())),
            _ => {
                return Err(DbError::Other(format!(
                    "Unsupported value type in query: {:?}",
                    value
                )));
            }
        }
    }

    // Second pass: create references to the stored values
    let mut bool_idx = 0;
    let mut int_idx = 0;
    let mut big_int_idx = 0;
    let mut string_idx = 0;

    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(values.iter().count());

    for value in values.iter() {
        match value {
            Value::Bool(_) => {
                params.push(&bools[bool_idx] as &dyn ToSql);
                bool_idx += 1;
            }
            Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) => {
                params.push(&ints[int_idx] as &dyn ToSql);
                int_idx += 1;
            }
            Value::BigInt(_) => {
                params.push(&big_ints[big_int_idx] as &dyn ToSql);
                big_int_idx += 1;
            }
            Value::String(_) => {
                params.push(&strings[string_idx] as &dyn ToSql);
                string_idx += 1;
            }
            // Rejected in the first pass
            _ => {}
        }
    }

    f(&params)
}
