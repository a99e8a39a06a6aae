//! Basic table lifecycle on a throwaway database.
//!
//! Creates a `cereals` table, inserts two rows, then selects, updates,
//! deletes, and counts them.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p databased-demos --example cereals
//! ```

use databased_core::Value;
use databased_demos::scratch_db;
use databased_sqlite::Select;

fn main() {
    let (_dir, mut db) = scratch_db("cereals").unwrap();

    // === Create and fill ===
    db.create_table(
        "cereals",
        &["id INTEGER PRIMARY KEY", "name TEXT NOT NULL", "brand TEXT"],
    )
    .unwrap();
    let inserted = db
        .insert(
            "cereals",
            &["name", "brand"],
            &[
                vec![Value::from("Sugar Berries"), Value::from("Super Health")],
                vec![Value::from("Shreddy Bois"), Value::from("Dr. Wheat")],
            ],
        )
        .unwrap();
    println!("Inserted {inserted} rows");

    // === Read ===
    let rows = db.select("cereals", &Select::new().with_order_by("id")).unwrap();
    for row in &rows {
        println!(
            "  #{} {} ({})",
            row.get("id").unwrap(),
            row.get("name").unwrap(),
            row.get("brand").unwrap()
        );
    }

    // === Change ===
    let updated = db
        .update("cereals", "brand", "Big Gravy", Some("brand = 'Dr. Wheat'"))
        .unwrap();
    println!("Updated {updated} rows");

    let deleted = db
        .delete("cereals", Some("name = 'Shreddy Bois'"))
        .unwrap();
    println!("Deleted {deleted} rows");

    println!("{} cereals left", db.count_rows("cereals").unwrap());

    // === Introspect ===
    for column in db.describe("cereals").unwrap() {
        println!(
            "  {} {}{}",
            column.name,
            column.declared_type,
            if column.is_primary_key() { " (primary key)" } else { "" }
        );
    }

    db.close().unwrap();
}
