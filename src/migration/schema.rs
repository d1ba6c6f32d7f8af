//! The reservation schema.
//!
//! Every foreign key is `ON DELETE RESTRICT`: removing a row that is still
//! referenced fails instead of cascading.

use super::{Migration, SchemaManager};
use crate::executor::DbError;
use sea_query::{ColumnDef, Expr, ForeignKey, ForeignKeyAction, Index, Table};

pub fn migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(CreateReservationSchema)]
}

pub struct CreateReservationSchema;

fn id() -> ColumnDef {
    ColumnDef::new("id")
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn now(name: &'static str) -> ColumnDef {
    ColumnDef::new(name)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

fn restrict(name: &str, from: (&'static str, &'static str), to: &'static str) -> sea_query::ForeignKeyCreateStatement {
    ForeignKey::create()
        .name(name)
        .from(from.0, from.1)
        .to(to, "id")
        .on_delete(ForeignKeyAction::Restrict)
        .on_update(ForeignKeyAction::Restrict)
        .to_owned()
}

/// `created_by`/`created_at`/`updated_by`/`updated_at` plus the user FKs.
fn with_audit(table: &mut sea_query::TableCreateStatement, name: &'static str) {
    table
        .col(ColumnDef::new("created_by").big_integer().not_null())
        .col(&mut now("created_at"))
        .col(ColumnDef::new("updated_by").big_integer().null())
        .col(&mut now("updated_at"))
        .foreign_key(&mut restrict(&format!("fk_{name}_created_by"), (name, "created_by"), "users"))
        .foreign_key(&mut restrict(&format!("fk_{name}_updated_by"), (name, "updated_by"), "users"));
}

/// `retired_at`/`retired_by` for soft-retired hierarchy rows.
fn with_retirement(table: &mut sea_query::TableCreateStatement, name: &'static str) {
    table
        .col(ColumnDef::new("retired_at").timestamp_with_time_zone().null())
        .col(ColumnDef::new("retired_by").big_integer().null())
        .foreign_key(&mut restrict(&format!("fk_{name}_retired_by"), (name, "retired_by"), "users"));
}

impl Migration for CreateReservationSchema {
    fn name(&self) -> &str {
        "create_reservation_schema"
    }

    fn version(&self) -> i64 {
        20250101000000
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.create_table(
            Table::create()
                .table("users")
                .col(&mut id())
                .col(ColumnDef::new("name").text().not_null())
                .col(&mut now("created_at"))
                .to_owned(),
        )?;

        let mut fridges = Table::create()
            .table("fridges")
            .col(&mut id())
            .col(ColumnDef::new("name").text().not_null().unique_key())
            .col(ColumnDef::new("location").text().not_null())
            .col(ColumnDef::new("description").text().null())
            .to_owned();
        with_audit(&mut fridges, "fridges");
        manager.create_table(fridges)?;

        let mut shelves = Table::create()
            .table("shelves")
            .col(&mut id())
            .col(ColumnDef::new("fridge_id").big_integer().not_null())
            .col(ColumnDef::new("shelf_number").integer().not_null())
            .col(ColumnDef::new("shelf_name").text().not_null())
            .foreign_key(&mut restrict("fk_shelves_fridge", ("shelves", "fridge_id"), "fridges"))
            .to_owned();
        with_audit(&mut shelves, "shelves");
        with_retirement(&mut shelves, "shelves");
        manager.create_table(shelves)?;

        let mut slots = Table::create()
            .table("slots")
            .col(&mut id())
            .col(ColumnDef::new("shelf_id").big_integer().not_null())
            .col(ColumnDef::new("slot_number").integer().not_null())
            .col(ColumnDef::new("is_disabled").boolean().not_null().default(false))
            .foreign_key(&mut restrict("fk_slots_shelf", ("slots", "shelf_id"), "shelves"))
            .to_owned();
        with_audit(&mut slots, "slots");
        with_retirement(&mut slots, "slots");
        manager.create_table(slots)?;

        manager.create_table(
            Table::create()
                .table("bookings")
                .col(&mut id())
                .col(ColumnDef::new("slot_id").big_integer().not_null())
                .col(ColumnDef::new("user_id").big_integer().not_null())
                .col(ColumnDef::new("start_time").timestamp_with_time_zone().not_null())
                .col(ColumnDef::new("end_time").timestamp_with_time_zone().not_null())
                .col(ColumnDef::new("note").text().null())
                .col(ColumnDef::new("cancelled_at").timestamp_with_time_zone().null())
                .col(ColumnDef::new("cancelled_by").big_integer().null())
                .col(ColumnDef::new("cleared_at").timestamp_with_time_zone().null())
                .col(ColumnDef::new("cleared_by").big_integer().null())
                .col(&mut now("created_at"))
                .col(&mut now("updated_at"))
                .foreign_key(&mut restrict("fk_bookings_slot", ("bookings", "slot_id"), "slots"))
                .foreign_key(&mut restrict("fk_bookings_user", ("bookings", "user_id"), "users"))
                .foreign_key(&mut restrict("fk_bookings_cancelled_by", ("bookings", "cancelled_by"), "users"))
                .foreign_key(&mut restrict("fk_bookings_cleared_by", ("bookings", "cleared_by"), "users"))
                .to_owned(),
        )?;
        manager.execute_raw(
            "ALTER TABLE bookings ADD CONSTRAINT bookings_window_ordered \
             CHECK (end_time > start_time)",
        )?;
        manager.execute_raw(
            "ALTER TABLE bookings ADD CONSTRAINT bookings_single_terminal_state \
             CHECK (cleared_at IS NULL OR cancelled_at IS NULL)",
        )?;

        manager.create_table(
            Table::create()
                .table("booking_items")
                .col(&mut id())
                .col(ColumnDef::new("booking_id").big_integer().not_null())
                .col(ColumnDef::new("name").text().not_null())
                .col(ColumnDef::new("quantity").integer().not_null())
                .col(ColumnDef::new("note").text().null())
                .foreign_key(&mut restrict("fk_booking_items_booking", ("booking_items", "booking_id"), "bookings"))
                .to_owned(),
        )?;
        manager.execute_raw(
            "ALTER TABLE booking_items ADD CONSTRAINT booking_items_quantity_positive \
             CHECK (quantity > 0)",
        )?;

        for (name, table, column) in [
            ("idx_shelves_fridge_id", "shelves", "fridge_id"),
            ("idx_slots_shelf_id", "slots", "shelf_id"),
            ("idx_bookings_slot_id", "bookings", "slot_id"),
            ("idx_bookings_user_id", "bookings", "user_id"),
            ("idx_booking_items_booking_id", "booking_items", "booking_id"),
        ] {
            manager.create_index(
                Index::create()
                    .name(name)
                    .table(table)
                    .col(Expr::col(column))
                    .to_owned(),
            )?;
        }

        Ok(())
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        for table in ["booking_items", "bookings", "slots", "shelves", "fridges", "users"] {
            manager.drop_table(Table::drop().table(table).if_exists().to_owned())?;
        }
        Ok(())
    }
}
