//! # Larder
//!
//! Coroutine-native reservation core for shared fridges on PostgreSQL, built
//! for the `may` runtime.
//!
//! A fridge holds shelves, a shelf holds slots, and a booking reserves one slot
//! for a time window together with a list of items. The crate keeps the
//! hierarchy in step with edits, keeps `slots.is_disabled` in step with the
//! bookings written against each slot, and projects both back out for readers.
//!
//! - [`hierarchy`]: create, edit and delete fridges; shelf and slot diffs
//! - [`ledger`]: booking create, amend, clear and cancel
//! - [`reconciler`]: the availability sweep
//! - [`views`]: read projections
//! - [`service::Larder`]: pool plus one transaction per operation
//!
//! ```no_run
//! use larder::{Larder, LarderConfig, Viewer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let larder = Larder::connect(LarderConfig::load()?)?;
//! larder.migrate()?;
//! for booking in larder.list_bookings(&Viewer::new(1))? {
//!     println!("{} on slot {}", booking.booking.id, booking.booking.slot_id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod diff;
pub mod error;
pub mod executor;
pub mod hierarchy;
pub mod ledger;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod pool;
pub mod query;
pub mod raw_sql;
pub mod reconciler;
pub mod service;
pub mod transaction;
pub mod views;

pub use config::LarderConfig;
pub use connection::{connect, ConnectionError};
pub use error::{ReservationError, ReservationResult};
pub use executor::{DbError, DbExecutor, PgExecutor};
pub use pool::{DbPool, PoolError, PooledConnection};
pub use raw_sql::{find_all_by_statement, find_optional_by_statement, query_value};
pub use reconciler::SweepReport;
pub use service::Larder;
pub use transaction::{IsolationLevel, Transaction, TransactionError};
pub use views::{Capability, FridgeNode, ShelfNode, SlotNode, Viewer};
