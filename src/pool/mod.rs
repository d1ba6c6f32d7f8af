//! Connection pool: persistent `may_postgres` connections handed out one per request.

pub mod config;
pub mod manager;

pub use manager::{DbPool, PoolError, PooledConnection};
