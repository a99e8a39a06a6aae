//! Core value types for the `databased` workspace.
//!
//! This crate defines the data that flows between the SQLite manager and
//! its front ends:
//!
//! - [`Value`]: a single cell (integer, real, text, blob, timestamp, null).
//! - [`Row`]: an ordered column-name → value mapping; every query returns
//!   a `Vec<Row>`.
//! - [`ColumnInfo`]: one column descriptor from table introspection.
//! - [`MatchCriteria`]: `(column, value)` pairs for the match-criteria API.
//!
//! Identifier helpers ([`quote_identifier`], [`validate_identifier`]) guard
//! the only places where names are interpolated into SQL text.
//!
//! # Example
//!
//! ```
//! use databased_core::*;
//!
//! let row: Row = vec![("name", Value::from("Sugar Berries")), ("id", Value::from(1))]
//!     .into_iter()
//!     .collect();
//! assert_eq!(row.get_str("name"), Some("Sugar Berries"));
//!
//! let literals: Vec<String> = row.values().map(Value::to_sql_literal).collect();
//! assert_eq!(literals, vec!["'Sugar Berries'", "1"]);
//! ```

mod types;
mod validate;

pub use types::*;
pub use validate::{ValidationError, quote_identifier, quote_identifier_list, validate_identifier};
