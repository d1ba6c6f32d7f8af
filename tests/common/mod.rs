//! Shared fixtures for the PostgreSQL integration tests.
//!
//! Tests need a database named by `TEST_DATABASE_URL`; without it every test
//! returns early. Each test creates its own users and a uniquely named fridge,
//! so tests can share one database and run in parallel.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use larder::model::{
    Booking, FridgeDetail, FridgeDraft, ItemDraft, NewBooking, ShelfDraft, SlotDraft,
};
use larder::{DbExecutor, Larder, LarderConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

static MIGRATE: Once = Once::new();
static SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// A `Larder` on the test database with the schema applied, or `None` when
/// `TEST_DATABASE_URL` is unset.
pub fn larder() -> Option<Larder> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };
    let _ = env_logger::builder().is_test(true).try_init();

    let mut config = LarderConfig::default();
    config.database.url = url;
    config.database.max_connections = 4;
    config.database.pool_timeout_seconds = 10;
    let larder = Larder::connect(config).expect("Failed to connect to TEST_DATABASE_URL");

    MIGRATE.call_once(|| {
        larder.migrate().expect("Failed to apply migrations");
    });
    Some(larder)
}

pub fn unique(prefix: &str) -> String {
    let n = SEQUENCE.fetch_add(1, Ordering::SeqCst);
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{prefix}-{}-{nanos}-{n}", std::process::id())
}

pub fn create_user(larder: &Larder, name: &str) -> i64 {
    let connection = larder.pool().acquire().expect("Failed to acquire connection");
    let row = connection
        .query_one(
            "INSERT INTO users (name) VALUES ($1) RETURNING id",
            &[&unique(name)],
        )
        .expect("Failed to insert user");
    row.get::<_, i64>(0)
}

/// A draft with `shelves[i]` slots on shelf `i + 1`.
pub fn draft(name: &str, shelves: &[usize]) -> FridgeDraft {
    FridgeDraft {
        name: unique(name),
        location: "2F pantry".to_string(),
        description: None,
        shelves: shelves
            .iter()
            .enumerate()
            .map(|(i, &slots)| {
                let number = i as i32 + 1;
                ShelfDraft::new(
                    number,
                    format!("S{number}"),
                    (1..=slots as i32).map(SlotDraft::new).collect(),
                )
            })
            .collect(),
    }
}

pub fn create_fridge(larder: &Larder, actor: i64, shelves: &[usize]) -> FridgeDetail {
    larder
        .create_fridge(actor, &draft("F", shelves))
        .expect("Failed to create fridge")
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()
}

pub fn new_booking(slot_id: i64, user_id: i64, items: Vec<ItemDraft>) -> NewBooking {
    NewBooking {
        slot_id,
        user_id,
        start_time: start(),
        end_time: start() + Duration::hours(2),
        note: None,
        items,
    }
}

/// A booking that ends a day from now, so single-booking reads still see it.
pub fn upcoming_booking(slot_id: i64, user_id: i64, items: Vec<ItemDraft>) -> NewBooking {
    let now = Utc::now();
    NewBooking {
        slot_id,
        user_id,
        start_time: now,
        end_time: now + Duration::days(1),
        note: Some("leftovers".to_string()),
        items,
    }
}

pub fn book(larder: &Larder, slot_id: i64, user_id: i64) -> Booking {
    larder
        .create_booking(&new_booking(slot_id, user_id, vec![ItemDraft::new("milk", 1)]))
        .expect("Failed to create booking")
}

pub fn is_disabled(larder: &Larder, slot_id: i64) -> bool {
    let connection = larder.pool().acquire().expect("Failed to acquire connection");
    let row = connection
        .query_one("SELECT is_disabled FROM slots WHERE id = $1", &[&slot_id])
        .expect("Failed to read slot");
    row.get::<_, bool>(0)
}

/// Force a slot flag out of step with its bookings.
pub fn set_disabled(larder: &Larder, slot_id: i64, disabled: bool) {
    let connection = larder.pool().acquire().expect("Failed to acquire connection");
    connection
        .execute(
            "UPDATE slots SET is_disabled = $2 WHERE id = $1",
            &[&slot_id, &disabled],
        )
        .expect("Failed to update slot");
}

/// Bookings on `slot_id` that are still active although the slot is retired.
pub fn active_bookings_on_retired_slot(larder: &Larder, slot_id: i64) -> i64 {
    let connection = larder.pool().acquire().expect("Failed to acquire connection");
    let row = connection
        .query_one(
            "SELECT COUNT(*) FROM slots s JOIN bookings b ON b.slot_id = s.id \
             WHERE s.id = $1 AND s.retired_at IS NOT NULL \
             AND b.cleared_at IS NULL AND b.cancelled_at IS NULL",
            &[&slot_id],
        )
        .expect("Failed to count bookings");
    row.get::<_, i64>(0)
}
