//! Integration tests for fridge create/edit/delete and the shelf/slot sync.
//!
//! These tests require a running PostgreSQL database named by
//! `TEST_DATABASE_URL`; without it they return early.

#[path = "../common/mod.rs"]
mod common;

use common::{
    active_bookings_on_retired_slot, book, create_fridge, create_user, draft, is_disabled,
    new_booking,
};
use larder::model::{FridgeEdit, ItemDraft, RecordId, ShelfDraft, SlotDraft};
use larder::ReservationError;
use std::sync::Arc;

#[test]
fn test_create_fridge_builds_tree() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "builder");

    let detail = create_fridge(&larder, user, &[2, 3]);
    assert_eq!(detail.shelves.len(), 2);
    assert_eq!(detail.shelves[0].shelf.shelf_name, "S1");
    assert_eq!(detail.shelves[1].slots.len(), 3);
    assert!(detail.slots().all(|s| !s.is_disabled));
    assert!(detail.slots().all(|s| s.audit.created_by == user));
    assert_eq!(detail.fridge.audit.created_by, user);

    let same = larder.get_fridge(detail.fridge.id).expect("Failed to read fridge");
    assert_eq!(same, detail);
}

#[test]
fn test_duplicate_fridge_name_conflicts() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "twin");
    let original = draft("Twin", &[1]);
    larder.create_fridge(user, &original).expect("Failed to create fridge");

    let err = larder.create_fridge(user, &original).unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");
}

#[test]
fn test_invalid_drafts_are_rejected() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "careless");

    let err = larder.create_fridge(user, &draft("Empty", &[])).unwrap_err();
    assert!(matches!(err, ReservationError::Validation(_)));

    let err = larder.create_fridge(user, &draft("Hollow", &[2, 0])).unwrap_err();
    assert!(matches!(err, ReservationError::Validation(_)));
}

#[test]
fn test_edit_updates_creates_and_retires() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "editor");
    let editor = create_user(&larder, "second-editor");
    let detail = create_fridge(&larder, user, &[2, 1]);
    let kept = &detail.shelves[0];
    let dropped_shelf = detail.shelves[1].shelf.id;

    let edit = FridgeEdit {
        name: detail.fridge.name.clone(),
        location: "3F kitchen".to_string(),
        description: Some("by the window".to_string()),
        shelves: Some(vec![
            ShelfDraft {
                id: Some(RecordId::Persisted(kept.shelf.id)),
                shelf_number: 1,
                shelf_name: "Top".to_string(),
                slots: vec![
                    SlotDraft::existing(kept.slots[0].id, 1),
                    SlotDraft {
                        id: Some(RecordId::Draft("new-1".to_string())),
                        slot_number: 3,
                    },
                ],
            },
            ShelfDraft::new(2, "Door", vec![SlotDraft::new(1)]),
        ]),
    };
    let updated = larder
        .update_fridge(detail.fridge.id, editor, &edit)
        .expect("Failed to update fridge");

    assert_eq!(updated.fridge.location, "3F kitchen");
    assert_eq!(updated.fridge.audit.updated_by, Some(editor));
    assert_eq!(updated.shelves.len(), 2);

    let top = &updated.shelves[0];
    assert_eq!(top.shelf.id, kept.shelf.id);
    assert_eq!(top.shelf.shelf_name, "Top");
    let numbers: Vec<_> = top.slots.iter().map(|s| s.slot_number).collect();
    assert_eq!(numbers, vec![1, 3]);
    assert_eq!(top.slots[0].id, kept.slots[0].id);
    assert!(top.slots.iter().all(|s| s.id != kept.slots[1].id));

    let door = &updated.shelves[1];
    assert_ne!(door.shelf.id, dropped_shelf);
    assert_eq!(door.shelf.shelf_name, "Door");
}

#[test]
fn test_edit_without_shelves_keeps_tree() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "renamer");
    let detail = create_fridge(&larder, user, &[1, 1]);

    let mut edit = FridgeEdit::from_detail(&detail);
    edit.shelves = None;
    edit.location = "Lobby".to_string();
    let updated = larder
        .update_fridge(detail.fridge.id, user, &edit)
        .expect("Failed to update fridge");

    assert_eq!(updated.fridge.location, "Lobby");
    assert_eq!(updated.shelves.len(), 2);
}

#[test]
fn test_resubmitting_tree_is_stable() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "idle");
    let detail = create_fridge(&larder, user, &[2, 2]);

    let updated = larder
        .update_fridge(detail.fridge.id, user, &FridgeEdit::from_detail(&detail))
        .expect("Failed to update fridge");
    let before: Vec<_> = detail.slots().map(|s| s.id).collect();
    let after: Vec<_> = updated.slots().map(|s| s.id).collect();
    assert_eq!(before, after);
}

#[test]
fn test_removing_reserved_slot_conflicts() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "holder");
    let detail = create_fridge(&larder, user, &[2, 1]);
    let reserved = detail.shelves[0].slots[1].id;
    book(&larder, reserved, user);

    // Drop the reserved slot from its shelf
    let mut edit = FridgeEdit::from_detail(&detail);
    if let Some(shelves) = edit.shelves.as_mut() {
        shelves[0].slots.truncate(1);
    }
    let err = larder.update_fridge(detail.fridge.id, user, &edit).unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");

    // Drop the whole shelf holding it
    let mut edit = FridgeEdit::from_detail(&detail);
    if let Some(shelves) = edit.shelves.as_mut() {
        shelves.remove(0);
    }
    let err = larder.update_fridge(detail.fridge.id, user, &edit).unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");

    let unchanged = larder.get_fridge(detail.fridge.id).expect("Failed to read fridge");
    assert_eq!(unchanged.slots().count(), 3);
}

#[test]
fn test_shelf_removal_races_booking() {
    let Some(larder) = common::larder() else { return };
    let larder = Arc::new(larder);
    let user = create_user(&larder, "mover");

    for _ in 0..5 {
        let detail = create_fridge(&larder, user, &[1, 1]);
        let fridge_id = detail.fridge.id;
        let slot = detail.shelves[0].slots[0].id;
        let mut edit = FridgeEdit::from_detail(&detail);
        if let Some(shelves) = edit.shelves.as_mut() {
            shelves.remove(0);
        }

        let editor = {
            let larder = Arc::clone(&larder);
            may::go!(move || larder.update_fridge(fridge_id, user, &edit))
        };
        let booker = {
            let larder = Arc::clone(&larder);
            may::go!(move || {
                let booking = new_booking(slot, user, vec![ItemDraft::new("yogurt", 1)]);
                larder.create_booking(&booking)
            })
        };
        let edited = editor.join().expect("coroutine panicked");
        let booked = booker.join().expect("coroutine panicked");

        match (&edited, &booked) {
            (Err(err), Ok(_)) => {
                assert!(err.is_conflict(), "expected conflict, got {err}");
                let fridge = larder.get_fridge(fridge_id).expect("Failed to read fridge");
                assert!(fridge.slots().any(|s| s.id == slot && s.is_disabled));
                assert!(is_disabled(&larder, slot));
            }
            (Ok(fridge), Err(err)) => {
                assert!(
                    matches!(err, ReservationError::NotFound { entity: "slot", .. }),
                    "expected missing slot, got {err}"
                );
                assert!(fridge.slots().all(|s| s.id != slot));
            }
            _ => panic!("edit {edited:?} and booking {booked:?} must not both succeed or fail"),
        }
        assert_eq!(active_bookings_on_retired_slot(&larder, slot), 0);
    }
}

#[test]
fn test_foreign_ids_conflict() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "thief");
    let mine = create_fridge(&larder, user, &[1]);
    let theirs = create_fridge(&larder, user, &[1]);

    let mut edit = FridgeEdit::from_detail(&mine);
    if let Some(shelves) = edit.shelves.as_mut() {
        shelves[0].id = Some(RecordId::Persisted(theirs.shelves[0].shelf.id));
    }
    let err = larder.update_fridge(mine.fridge.id, user, &edit).unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");

    let mut edit = FridgeEdit::from_detail(&mine);
    if let Some(shelves) = edit.shelves.as_mut() {
        shelves[0].slots[0].id = Some(RecordId::Persisted(theirs.shelves[0].slots[0].id));
    }
    let err = larder.update_fridge(mine.fridge.id, user, &edit).unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");
}

#[test]
fn test_update_unknown_fridge() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "ghost");
    let edit = FridgeEdit {
        name: "nowhere".to_string(),
        location: "nowhere".to_string(),
        description: None,
        shelves: None,
    };
    let err = larder.update_fridge(i64::MAX, user, &edit).unwrap_err();
    assert!(matches!(err, ReservationError::NotFound { entity: "fridge", .. }));
}

#[test]
fn test_delete_fridge() {
    let Some(larder) = common::larder() else { return };
    let user = create_user(&larder, "demolisher");

    let empty = create_fridge(&larder, user, &[2]);
    larder.delete_fridge(empty.fridge.id).expect("Failed to delete fridge");
    let err = larder.get_fridge(empty.fridge.id).unwrap_err();
    assert!(matches!(err, ReservationError::NotFound { .. }));

    let used = create_fridge(&larder, user, &[1]);
    let slot = used.shelves[0].slots[0].id;
    let booking = book(&larder, slot, user);
    larder
        .clear_or_cancel_booking(booking.id, slot, user, "clear")
        .expect("Failed to clear booking");
    // Historic bookings still block the delete
    let err = larder.delete_fridge(used.fridge.id).unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");
    assert!(larder.get_fridge(used.fridge.id).is_ok());

    let err = larder.delete_fridge(i64::MAX).unwrap_err();
    assert!(matches!(err, ReservationError::NotFound { entity: "fridge", .. }));
}
