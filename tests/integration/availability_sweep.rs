//! Integration tests for the availability sweep.
//!
//! These tests require a running PostgreSQL database named by
//! `TEST_DATABASE_URL`; without it they return early. Other tests may run
//! concurrently against the same database, so assertions only look at the
//! slots each test created.

#[path = "../common/mod.rs"]
mod common;

use common::{book, create_fridge, create_user, is_disabled, set_disabled};

#[test]
fn test_sweep_releases_stuck_slot() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "drifter");
    let fridge = create_fridge(&larder, user, &[1]);
    let slot = fridge.shelves[0].slots[0].id;

    let booking = book(&larder, slot, user);
    larder
        .clear_or_cancel_booking(booking.id, slot, user, "cancel")
        .expect("Failed to cancel booking");
    set_disabled(&larder, slot, true);

    let report = larder.sweep().expect("Failed to sweep");
    assert!(report.released.contains(&slot));
    assert!(report.scanned >= 1);
    assert!(!is_disabled(&larder, slot));
}

#[test]
fn test_sweep_reserves_slot_with_active_booking() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "unflagged");
    let fridge = create_fridge(&larder, user, &[1]);
    let slot = fridge.shelves[0].slots[0].id;

    book(&larder, slot, user);
    set_disabled(&larder, slot, false);

    let report = larder.sweep().expect("Failed to sweep");
    assert!(report.reserved.contains(&slot));
    assert!(is_disabled(&larder, slot));
}

#[test]
fn test_sweep_leaves_consistent_slots() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "tidy");
    let fridge = create_fridge(&larder, user, &[3]);
    let slots: Vec<i64> = fridge.shelves[0].slots.iter().map(|s| s.id).collect();

    book(&larder, slots[0], user);
    let done = book(&larder, slots[1], user);
    larder
        .clear_or_cancel_booking(done.id, slots[1], user, "clear")
        .expect("Failed to clear booking");

    let report = larder.sweep().expect("Failed to sweep");
    for slot in &slots {
        assert!(!report.released.contains(slot));
        assert!(!report.reserved.contains(slot));
    }
    assert!(is_disabled(&larder, slots[0]));
    assert!(!is_disabled(&larder, slots[1]));
    assert!(!is_disabled(&larder, slots[2]));
}

#[test]
fn test_sweep_keeps_expired_uncleared_booking() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "forgetful");
    let fridge = create_fridge(&larder, user, &[1]);
    let slot = fridge.shelves[0].slots[0].id;

    // The shared fixture window lies in the past
    book(&larder, slot, user);

    let report = larder.sweep().expect("Failed to sweep");
    assert!(!report.released.contains(&slot));
    assert!(is_disabled(&larder, slot));
}
