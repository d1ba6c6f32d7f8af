//! Integration tests for the read projections.
//!
//! These tests require a running PostgreSQL database named by
//! `TEST_DATABASE_URL`; without it they return early.

#[path = "../common/mod.rs"]
mod common;

use common::{book, create_fridge, create_user, upcoming_booking};
use larder::model::{BookingState, FridgeEdit, ItemDraft};
use larder::{Capability, ReservationError, Viewer};

#[test]
fn test_fridge_tree_nests_bookings() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "treeuser");
    let fridge = create_fridge(&larder, user, &[2, 1]);
    let slot = fridge.shelves[0].slots[1].id;

    let first = book(&larder, slot, user);
    larder
        .clear_or_cancel_booking(first.id, slot, user, "clear")
        .expect("Failed to clear booking");
    let second = book(&larder, slot, user);

    let tree = larder
        .list_fridge_tree(Some(fridge.fridge.id))
        .expect("Failed to read tree");
    assert_eq!(tree.len(), 1);
    let node = &tree[0];
    assert_eq!(node.fridge.id, fridge.fridge.id);
    assert_eq!(node.shelves.len(), 2);
    assert_eq!(node.shelves[0].slots.len(), 2);

    let slot_node = &node.shelves[0].slots[1];
    assert!(slot_node.slot.is_disabled);
    let states: Vec<_> = slot_node.bookings.iter().map(|b| (b.booking.id, b.state)).collect();
    assert_eq!(
        states,
        vec![(first.id, BookingState::Cleared), (second.id, BookingState::Active)]
    );
    assert_eq!(slot_node.bookings[1].booking.items[0].name, "milk");
    assert!(node.shelves[0].slots[0].bookings.is_empty());

    let json = serde_json::to_value(&tree).expect("Failed to serialize tree");
    assert_eq!(json[0]["shelves"][0]["slots"][1]["bookings"][1]["state"], "active");
}

#[test]
fn test_fridge_tree_hides_retired_rows() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "pruner");
    let fridge = create_fridge(&larder, user, &[1, 1]);

    let mut edit = FridgeEdit::from_detail(&fridge);
    if let Some(shelves) = edit.shelves.as_mut() {
        shelves.truncate(1);
    }
    larder
        .update_fridge(fridge.fridge.id, user, &edit)
        .expect("Failed to update fridge");

    let tree = larder
        .list_fridge_tree(Some(fridge.fridge.id))
        .expect("Failed to read tree");
    assert_eq!(tree[0].shelves.len(), 1);

    let summary = larder
        .list_fridges()
        .expect("Failed to list fridges")
        .into_iter()
        .find(|f| f.id == fridge.fridge.id)
        .expect("fridge missing from list");
    assert_eq!(summary.shelf_count, 1);
    assert_eq!(summary.slot_count, 1);
    assert_eq!(summary.free_slot_count, 1);
}

#[test]
fn test_unknown_fridge_tree() {
    let Some(larder) = common::larder() else { return };
    let err = larder.list_fridge_tree(Some(i64::MAX)).unwrap_err();
    assert!(matches!(err, ReservationError::NotFound { entity: "fridge", .. }));
}

#[test]
fn test_booking_visibility_follows_capability() {
    let Some(larder) = common::larder() else { return };
    let alice = create_user(&larder, "alice");
    let bob = create_user(&larder, "bob");
    let fridge = create_fridge(&larder, alice, &[2]);
    let mine = book(&larder, fridge.shelves[0].slots[0].id, alice);
    let theirs = book(&larder, fridge.shelves[0].slots[1].id, bob);

    let own = larder
        .list_bookings(&Viewer::new(alice))
        .expect("Failed to list bookings");
    assert!(own.iter().all(|b| b.owner.id == alice));
    assert!(own.iter().any(|b| b.booking.id == mine.id));
    assert!(own.iter().all(|b| b.booking.id != theirs.id));

    let all = larder
        .list_bookings(&Viewer::new(alice).with(Capability::ViewAllBookings))
        .expect("Failed to list bookings");
    assert!(all.iter().any(|b| b.booking.id == mine.id));
    assert!(all.iter().any(|b| b.booking.id == theirs.id));

    let labelled = all
        .iter()
        .find(|b| b.booking.id == theirs.id)
        .expect("booking missing from list");
    assert_eq!(labelled.slot.fridge_id, fridge.fridge.id);
    assert_eq!(labelled.slot.shelf_name, "S1");
    assert_eq!(labelled.slot.slot_number, 2);
    assert!(labelled.owner.name.starts_with("bob"));
}

#[test]
fn test_get_booking_only_while_running() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "reader");
    let fridge = create_fridge(&larder, user, &[2]);

    let upcoming = larder
        .create_booking(&upcoming_booking(
            fridge.shelves[0].slots[0].id,
            user,
            vec![ItemDraft::new("soup", 1).with_note("bring back the pot")],
        ))
        .expect("Failed to create booking");
    let view = larder.get_booking(upcoming.id).expect("Failed to read booking");
    assert_eq!(view.booking.note.as_deref(), Some("leftovers"));
    assert_eq!(view.booking.items[0].note.as_deref(), Some("bring back the pot"));
    assert_eq!(view.state, BookingState::Active);

    // Fixture windows end in 2025
    let past = book(&larder, fridge.shelves[0].slots[1].id, user);
    let err = larder.get_booking(past.id).unwrap_err();
    assert!(matches!(err, ReservationError::NotFound { entity: "booking", .. }));
}
