//! A typed convenience layer over one embedded SQLite database file.
//!
//! [`Databased`] owns a single lazily-opened connection and exposes
//! schema operations, data operations, and schema/data dumps on top of one
//! query executor. Values cross the boundary as
//! [`databased_core::Value`] cells and come back as
//! [`databased_core::Row`] mappings.
//!
//! # Architecture
//!
//! - **`connection`**: connection lifecycle, transactions, the query executor
//! - **`conditions`**: WHERE fragments from match criteria
//! - **`schema`**: create/drop/alter tables and catalog introspection
//! - **`select`** and **`data`**: SELECT assembly, counting, chunked
//!   bulk insert, update, delete, vacuum
//! - **`dump`**: `CREATE TABLE` and `INSERT` text for backups
//! - **`legacy`**: row access by match criteria
//!
//! # Quick start
//!
//! ```no_run
//! use databased_core::Value;
//! use databased_sqlite::{Databased, DatabaseConfig, Select};
//!
//! let mut db = Databased::new(DatabaseConfig::new("cereals.db")).unwrap();
//! db.create_table("cereals", &["id INTEGER PRIMARY KEY", "name TEXT NOT NULL", "brand TEXT"])
//!     .unwrap();
//! db.insert(
//!     "cereals",
//!     &["name", "brand"],
//!     &[vec![Value::from("Sugar Berries"), Value::from("Super Health")]],
//! )
//! .unwrap();
//!
//! let rows = db.select("cereals", &Select::new().with_order_by("name")).unwrap();
//! println!("{} cereals", rows.len());
//! db.close().unwrap();
//! ```
//!
//! # Scoped use
//!
//! ```no_run
//! use databased_sqlite::{Databased, DatabaseConfig};
//!
//! let tables = Databased::scoped(DatabaseConfig::new("cereals.db"), |db| db.list_tables())
//!     .unwrap();
//! ```

mod conditions;
mod config;
mod connection;
mod data;
mod dump;
mod error;
mod legacy;
mod schema;
mod select;

pub use conditions::{Conditions, build_conditions};
pub use config::{DEFAULT_MAX_VARIABLES, DEFAULT_TIMEOUT_SECS, DatabaseConfig, MAX_TIMEOUT_SECS};
pub use connection::Databased;
pub use error::{Error, Result};
pub use select::Select;
