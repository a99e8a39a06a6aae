//! WHERE-clause construction from match criteria.
//!
//! [`build_conditions`] turns `(column, value)` pairs into one
//! parenthesized conjunction. Column names are quoted identifiers; values
//! are always bound as parameters, never spliced into the SQL text.
//!
//! | mode      | fragment per pair          | bound parameter |
//! |-----------|----------------------------|-----------------|
//! | exact     | `"col" = ?`                | `value`         |
//! | substring | `"col" LIKE ?`             | `%value%`       |
//!
//! A `NULL` value matches with `"col" IS NULL` in either mode.
//!
//! Only conjunctions are produced. Callers that need `OR` or nesting pass
//! a raw WHERE string to [`select`](crate::Databased::select),
//! [`update`](crate::Databased::update), or
//! [`delete`](crate::Databased::delete) instead.

use databased_core::{MatchCriteria, Value, quote_identifier};

use crate::error::{Error, Result};

/// A WHERE fragment and the parameters it binds, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Builds `("c1" = ? AND "c2" = ?)` (or the `LIKE` form when `exact_match`
/// is false) from `criteria`.
///
/// # Errors
///
/// Returns [`Error::Misuse`] for empty criteria: callers must omit the
/// WHERE clause instead. Returns [`Error::InvalidIdentifier`] for an empty
/// column name.
///
/// # Examples
///
/// ```
/// use databased_core::MatchCriteria;
/// use databased_sqlite::build_conditions;
///
/// let criteria = MatchCriteria::new().with("name", "Bob").with("state", "Alaska");
/// let exact = build_conditions(&criteria, true).unwrap();
/// assert_eq!(exact.sql, r#"("name" = ? AND "state" = ?)"#);
///
/// let partial = build_conditions(&criteria, false).unwrap();
/// assert_eq!(partial.sql, r#"("name" LIKE ? AND "state" LIKE ?)"#);
/// assert_eq!(partial.params[0].as_str(), Some("%Bob%"));
/// ```
pub fn build_conditions(criteria: &MatchCriteria, exact_match: bool) -> Result<Conditions> {
    if criteria.is_empty() {
        return Err(Error::Misuse(
            "match criteria cannot be empty; omit the WHERE clause instead".into(),
        ));
    }

    let mut clauses = Vec::with_capacity(criteria.len());
    let mut params = Vec::with_capacity(criteria.len());
    for (column, value) in criteria.iter() {
        let column = quote_identifier(column)?;
        if value.is_null() {
            clauses.push(format!("{column} IS NULL"));
        } else if exact_match {
            clauses.push(format!("{column} = ?"));
            params.push(value.clone());
        } else {
            clauses.push(format!("{column} LIKE ?"));
            params.push(Value::Text(format!("%{value}%")));
        }
    }

    Ok(Conditions {
        sql: format!("({})", clauses.join(" AND ")),
        params,
    })
}
