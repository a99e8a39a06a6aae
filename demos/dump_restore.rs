//! Dump a database to SQL text and rebuild it in a fresh file.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p databased-demos --example dump_restore
//! ```

use databased_core::Value;
use databased_demos::scratch_db;
use databased_sqlite::{DatabaseConfig, Databased};

fn main() {
    let (dir, mut source) = scratch_db("source").unwrap();
    source
        .create_table("brands", &["id INTEGER PRIMARY KEY", "name TEXT UNIQUE NOT NULL"])
        .unwrap();
    source
        .create_table(
            "cereals",
            &[
                "id INTEGER PRIMARY KEY",
                "name TEXT NOT NULL",
                "brand_id INTEGER REFERENCES brands(id)",
                "rating REAL DEFAULT 0",
            ],
        )
        .unwrap();
    source
        .insert("brands", &["name"], &[vec![Value::from("Super Health")]])
        .unwrap();
    source
        .insert(
            "cereals",
            &["name", "brand_id", "rating"],
            &[
                vec![Value::from("Sugar Berries"), Value::from(1), Value::from(4.5)],
                vec![Value::from("O'Malley Oats"), Value::from(1), Value::Null],
            ],
        )
        .unwrap();

    let schema_path = dir.path().join("schema.sql");
    let data_path = dir.path().join("data.sql");
    source.dump_schema(&schema_path, None).unwrap();
    source.dump_data(&data_path, None).unwrap();
    source.close().unwrap();

    println!("=== Schema ===");
    print!("{}", std::fs::read_to_string(&schema_path).unwrap());
    println!("=== Data ===");
    print!("{}", std::fs::read_to_string(&data_path).unwrap());

    let mut copy = Databased::new(DatabaseConfig::new(dir.path().join("copy.db"))).unwrap();
    copy.execute_script(&schema_path).unwrap();
    copy.execute_script(&data_path).unwrap();
    println!("=== Restored ===");
    for table in copy.list_tables().unwrap() {
        println!("  {table}: {} rows", copy.count_rows(&table).unwrap());
    }
    copy.close().unwrap();
}
