//! Integration tests for the booking ledger.
//!
//! These tests require a running PostgreSQL database named by
//! `TEST_DATABASE_URL`; without it they return early.

#[path = "../common/mod.rs"]
mod common;

use chrono::Duration;
use common::{book, create_fridge, create_user, is_disabled, new_booking, start};
use larder::model::{BookingAmendment, BookingState, ItemDraft};
use larder::ReservationError;
use std::sync::Arc;

#[test]
fn test_create_reserves_slot_and_blocks_second_booking() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "booker");
    let fridge = create_fridge(&larder, user, &[2]);
    let slot = fridge.shelves[0].slots[0].id;

    let booking = larder
        .create_booking(&new_booking(slot, user, vec![ItemDraft::new("milk", 1)]))
        .expect("Failed to create booking");
    assert_eq!(booking.slot_id, slot);
    assert_eq!(booking.items.len(), 1);
    assert_eq!(booking.items[0].name, "milk");
    assert!(is_disabled(&larder, slot));

    let err = larder
        .create_booking(&new_booking(slot, user, Vec::new()))
        .unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");

    // The loser left nothing behind
    let bookings = larder
        .list_fridge_tree(Some(fridge.fridge.id))
        .expect("Failed to read tree");
    assert_eq!(bookings[0].shelves[0].slots[0].bookings.len(), 1);
}

#[test]
fn test_cancel_frees_slot_for_next_booking() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "canceller");
    let fridge = create_fridge(&larder, user, &[1]);
    let slot = fridge.shelves[0].slots[0].id;
    let booking = book(&larder, slot, user);

    let cancelled = larder
        .clear_or_cancel_booking(booking.id, slot, user, "cancel")
        .expect("Failed to cancel booking");
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(cancelled.cancelled_by, Some(user));
    assert!(cancelled.cleared_at.is_none());
    assert_eq!(cancelled.state(), BookingState::Cancelled);
    assert!(!is_disabled(&larder, slot));

    book(&larder, slot, user);
    assert!(is_disabled(&larder, slot));
}

#[test]
fn test_clear_after_cancel_restamps() {
    let Some(larder) = common::larder() else { return };
    let owner = create_user(&larder, "owner");
    let admin = create_user(&larder, "admin");
    let fridge = create_fridge(&larder, owner, &[1]);
    let slot = fridge.shelves[0].slots[0].id;
    let booking = book(&larder, slot, owner);

    larder
        .clear_or_cancel_booking(booking.id, slot, owner, "cancel")
        .expect("Failed to cancel booking");
    let cleared = larder
        .clear_or_cancel_booking(booking.id, slot, admin, "clear")
        .expect("Failed to clear booking");

    assert_eq!(cleared.state(), BookingState::Cleared);
    assert_eq!(cleared.cleared_by, Some(admin));
    assert!(cleared.cancelled_at.is_none());
    assert!(!is_disabled(&larder, slot));
}

#[test]
fn test_restamp_keeps_slot_of_next_booking() {
    let Some(larder) = common::larder() else { return };
    let first = create_user(&larder, "first");
    let second = create_user(&larder, "second");
    let third = create_user(&larder, "third");
    let fridge = create_fridge(&larder, first, &[1]);
    let slot = fridge.shelves[0].slots[0].id;

    let earlier = book(&larder, slot, first);
    larder
        .clear_or_cancel_booking(earlier.id, slot, first, "cancel")
        .expect("Failed to cancel booking");
    let current = book(&larder, slot, second);

    let restamped = larder
        .clear_or_cancel_booking(earlier.id, slot, first, "cancel")
        .expect("Failed to re-cancel booking");
    assert_eq!(restamped.state(), BookingState::Cancelled);
    assert!(is_disabled(&larder, slot));

    let err = larder
        .create_booking(&new_booking(slot, third, Vec::new()))
        .unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");

    let view = larder.get_fridge(fridge.fridge.id).expect("Failed to read fridge");
    assert!(view.slots().all(|s| s.is_disabled));
    larder
        .clear_or_cancel_booking(current.id, slot, second, "clear")
        .expect("Failed to clear booking");
    assert!(!is_disabled(&larder, slot));
}

#[test]
fn test_restamp_races_new_booking() {
    let Some(larder) = common::larder() else { return };
    let larder = Arc::new(larder);
    let first = create_user(&larder, "first");
    let second = create_user(&larder, "second");

    for _ in 0..5 {
        let fridge = create_fridge(&larder, first, &[1]);
        let slot = fridge.shelves[0].slots[0].id;
        let earlier = book(&larder, slot, first);
        larder
            .clear_or_cancel_booking(earlier.id, slot, first, "clear")
            .expect("Failed to clear booking");

        let restamp = {
            let larder = Arc::clone(&larder);
            may::go!(move || larder.clear_or_cancel_booking(earlier.id, slot, first, "cancel"))
        };
        let rebook = {
            let larder = Arc::clone(&larder);
            may::go!(move || larder.create_booking(&new_booking(slot, second, Vec::new())))
        };
        restamp
            .join()
            .expect("coroutine panicked")
            .expect("Failed to re-cancel booking");
        rebook
            .join()
            .expect("coroutine panicked")
            .expect("Failed to rebook slot");

        assert!(is_disabled(&larder, slot));
        let err = larder
            .create_booking(&new_booking(slot, first, Vec::new()))
            .unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err}");
    }
}

#[test]
fn test_clear_or_cancel_rejects_bad_input() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "sloppy");
    let fridge = create_fridge(&larder, user, &[2]);
    let slots = &fridge.shelves[0].slots;
    let booking = book(&larder, slots[0].id, user);

    let err = larder
        .clear_or_cancel_booking(booking.id, slots[0].id, user, "archive")
        .unwrap_err();
    assert!(matches!(err, ReservationError::Validation(_)));

    let err = larder
        .clear_or_cancel_booking(booking.id, slots[1].id, user, "clear")
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(is_disabled(&larder, slots[0].id));

    let err = larder
        .clear_or_cancel_booking(i64::MAX, slots[0].id, user, "clear")
        .unwrap_err();
    assert!(matches!(err, ReservationError::NotFound { entity: "booking", .. }));
}

#[test]
fn test_create_on_unknown_slot_or_user() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "lost");
    let fridge = create_fridge(&larder, user, &[1]);
    let slot = fridge.shelves[0].slots[0].id;

    let err = larder
        .create_booking(&new_booking(i64::MAX, user, Vec::new()))
        .unwrap_err();
    assert!(matches!(err, ReservationError::NotFound { entity: "slot", .. }));

    let err = larder
        .create_booking(&new_booking(slot, i64::MAX, Vec::new()))
        .unwrap_err();
    assert!(matches!(err, ReservationError::NotFound { entity: "user", .. }));
    // The claim rolled back with the failed insert
    assert!(!is_disabled(&larder, slot));
}

#[test]
fn test_inverted_window_never_reaches_database() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "early");
    let fridge = create_fridge(&larder, user, &[1]);
    let slot = fridge.shelves[0].slots[0].id;

    let mut booking = new_booking(slot, user, Vec::new());
    booking.end_time = booking.start_time - Duration::minutes(1);
    let err = larder.create_booking(&booking).unwrap_err();
    assert!(matches!(err, ReservationError::Validation(_)));
    assert!(!is_disabled(&larder, slot));
}

#[test]
fn test_update_moves_booking_and_upserts_items() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "mover");
    let fridge = create_fridge(&larder, user, &[2]);
    let (from, to) = (fridge.shelves[0].slots[0].id, fridge.shelves[0].slots[1].id);

    let booking = larder
        .create_booking(&new_booking(
            from,
            user,
            vec![ItemDraft::new("milk", 1), ItemDraft::new("eggs", 6)],
        ))
        .expect("Failed to create booking");
    let milk = booking.items[0].id;

    let amended = larder
        .update_booking(&BookingAmendment {
            booking_id: booking.id,
            slot_id: to,
            user_id: user,
            start_time: start(),
            end_time: start() + Duration::hours(4),
            note: Some("moved down".to_string()),
            items: vec![
                ItemDraft::new("oat milk", 2).with_id(milk),
                ItemDraft::new("butter", 1).with_note("salted"),
            ],
        })
        .expect("Failed to update booking");

    assert_eq!(amended.slot_id, to);
    assert_eq!(amended.note.as_deref(), Some("moved down"));
    assert_eq!(amended.end_time, start() + Duration::hours(4));
    assert!(!is_disabled(&larder, from));
    assert!(is_disabled(&larder, to));

    // eggs was left out of the amendment and is kept
    let names: Vec<_> = amended.items.iter().map(|i| (i.name.as_str(), i.quantity)).collect();
    assert_eq!(names, vec![("oat milk", 2), ("eggs", 6), ("butter", 1)]);
    assert_eq!(amended.items[0].id, milk);
    assert_eq!(amended.items[2].note.as_deref(), Some("salted"));
}

#[test]
fn test_update_keeps_note_when_none() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "noter");
    let fridge = create_fridge(&larder, user, &[1]);
    let slot = fridge.shelves[0].slots[0].id;
    let mut draft = new_booking(slot, user, Vec::new());
    draft.note = Some("top left".to_string());
    let booking = larder.create_booking(&draft).expect("Failed to create booking");

    let amended = larder
        .update_booking(&BookingAmendment {
            booking_id: booking.id,
            slot_id: slot,
            user_id: user,
            start_time: booking.start_time,
            end_time: booking.end_time,
            note: None,
            items: Vec::new(),
        })
        .expect("Failed to update booking");
    assert_eq!(amended.note.as_deref(), Some("top left"));
    assert!(is_disabled(&larder, slot));
}

#[test]
fn test_update_conflicts() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "contender");
    let fridge = create_fridge(&larder, user, &[2]);
    let (a, b) = (fridge.shelves[0].slots[0].id, fridge.shelves[0].slots[1].id);
    let first = book(&larder, a, user);
    let second = book(&larder, b, user);

    let amendment = |booking_id, slot_id, items| BookingAmendment {
        booking_id,
        slot_id,
        user_id: user,
        start_time: start(),
        end_time: start() + Duration::hours(1),
        note: None,
        items,
    };

    // Moving onto a reserved slot
    let err = larder.update_booking(&amendment(first.id, b, Vec::new())).unwrap_err();
    assert!(err.is_conflict());
    assert!(is_disabled(&larder, a));

    // Claiming another booking's item
    let foreign = second.items[0].id;
    let err = larder
        .update_booking(&amendment(first.id, a, vec![ItemDraft::new("x", 1).with_id(foreign)]))
        .unwrap_err();
    assert!(err.is_conflict());

    // Editing a terminal booking
    larder
        .clear_or_cancel_booking(first.id, a, user, "clear")
        .expect("Failed to clear booking");
    let err = larder.update_booking(&amendment(first.id, a, Vec::new())).unwrap_err();
    assert!(err.is_conflict());
    assert!(!is_disabled(&larder, a));
}

#[test]
fn test_concurrent_creates_have_one_winner() {
    let Some(larder) = common::larder() else { return };
    let larder = Arc::new(larder);
    let user = create_user(&larder, "racer");
    let fridge = create_fridge(&larder, user, &[1]);
    let slot = fridge.shelves[0].slots[0].id;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let larder = Arc::clone(&larder);
            may::go!(move || larder.create_booking(&new_booking(slot, user, Vec::new())))
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("coroutine panicked"))
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(result.as_ref().unwrap_err().is_conflict());
    }
    assert!(is_disabled(&larder, slot));
}
