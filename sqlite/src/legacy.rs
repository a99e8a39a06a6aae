//! Row access by match criteria.
//!
//! The older API surface: rows are selected with `(column, value)` pairs
//! that go through [`build_conditions`] instead of raw WHERE strings.
//! Everything here routes through the same query executor as the rest of
//! the crate.

use databased_core::{MatchCriteria, Row, Value, quote_identifier, quote_identifier_list};
use tracing::{info, warn};

use crate::conditions::build_conditions;
use crate::connection::Databased;
use crate::error::{Error, Result};

impl Databased {
    /// Rows of `table` matching every criterion, or all rows for `None`.
    ///
    /// With `exact_match` false, each value matches as a substring.
    /// `order_by` is a raw ORDER BY expression.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use databased_sqlite::{Databased, DatabaseConfig};
    /// use databased_core::MatchCriteria;
    ///
    /// # let mut db = Databased::new(DatabaseConfig::new("cereals.db")).unwrap();
    /// let berries = db
    ///     .get_rows("cereals", Some(&MatchCriteria::new().with("name", "Berr")), false, Some("name"))
    ///     .unwrap();
    /// ```
    pub fn get_rows(
        &mut self,
        table: &str,
        criteria: Option<&MatchCriteria>,
        exact_match: bool,
        order_by: Option<&str>,
    ) -> Result<Vec<Row>> {
        let mut sql = format!("SELECT * FROM {}", quote_identifier(table)?);
        let params = push_conditions(&mut sql, criteria, exact_match)?;
        if let Some(order_by) = order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        self.query(&sql, &params)
    }

    /// Rows where any of `columns` (every column for `None`) contains
    /// `needle`. Each row appears once, in first-match order.
    pub fn find(
        &mut self,
        table: &str,
        needle: &str,
        columns: Option<&[&str]>,
    ) -> Result<Vec<Row>> {
        let columns: Vec<String> = match columns {
            Some(columns) => columns.iter().map(|c| c.to_string()).collect(),
            None => self.get_columns(table)?,
        };
        let mut found: Vec<Row> = Vec::new();
        for column in &columns {
            let criteria = MatchCriteria::new().with(column.as_str(), needle);
            for row in self.get_rows(table, Some(&criteria), false, None)? {
                if !found.contains(&row) {
                    found.push(row);
                }
            }
        }
        Ok(found)
    }

    /// Number of rows matching `criteria`, or of all rows for `None`.
    pub fn count_matching(
        &mut self,
        table: &str,
        criteria: Option<&MatchCriteria>,
        exact_match: bool,
    ) -> Result<usize> {
        match criteria {
            Some(criteria) => {
                let conditions = build_conditions(criteria, exact_match)?;
                self.count_where(table, "*", Some(&conditions.sql), &conditions.params, false)
            }
            None => self.count_rows(table),
        }
    }

    /// Sets `column` to `value` in rows exactly matching `criteria`, or in
    /// every row for `None`.
    pub fn update_matching(
        &mut self,
        table: &str,
        column: &str,
        value: impl Into<Value>,
        criteria: Option<&MatchCriteria>,
    ) -> Result<usize> {
        match criteria {
            Some(criteria) => {
                let conditions = build_conditions(criteria, true)?;
                self.update_where(
                    table,
                    column,
                    value.into(),
                    Some(&conditions.sql),
                    &conditions.params,
                )
            }
            None => self.update_where(table, column, value.into(), None, &[]),
        }
    }

    /// Deletes rows matching `criteria`. Unlike [`delete`](Self::delete)
    /// there is no all-rows form: the criteria must not be empty.
    pub fn delete_matching(
        &mut self,
        table: &str,
        criteria: &MatchCriteria,
        exact_match: bool,
    ) -> Result<usize> {
        let conditions = build_conditions(criteria, exact_match)?;
        self.delete_where(table, Some(&conditions.sql), &conditions.params)
    }

    /// Inserts one row and reports whether it was added.
    ///
    /// A constraint violation (a duplicate key, say) is logged and
    /// returned as `Ok(false)` so duplicate-skipping imports can carry on.
    /// Every other error propagates. Use [`insert`](Self::insert) when
    /// constraint violations must fail.
    ///
    /// Without `columns`, `values` must supply every column of the table.
    pub fn add_row(
        &mut self,
        table: &str,
        values: &[Value],
        columns: Option<&[&str]>,
    ) -> Result<bool> {
        if values.is_empty() {
            return Err(Error::Misuse("a row needs at least one value".into()));
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = match columns {
            Some(columns) => {
                if columns.len() != values.len() {
                    return Err(Error::Misuse(format!(
                        "{} values given for {} columns",
                        values.len(),
                        columns.len()
                    )));
                }
                format!(
                    "INSERT INTO {} ({}) VALUES ({placeholders})",
                    quote_identifier(table)?,
                    quote_identifier_list(columns)?
                )
            }
            None => format!("INSERT INTO {} VALUES ({placeholders})", quote_identifier(table)?),
        };

        match self.query(&sql, values) {
            Ok(_) => {
                info!(table, "added row");
                Ok(true)
            }
            Err(err) if err.is_constraint() => {
                warn!(table, error = %err, "skipped row");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Creates each table from a `name(column defs)` statement, skipping
    /// tables that already exist. Returns how many were created.
    pub fn create_tables<S: AsRef<str>>(&mut self, statements: &[S]) -> Result<usize> {
        let existing = self.list_tables()?;
        let mut created = 0;
        for statement in statements {
            let statement = statement.as_ref().trim();
            let Some((name, _)) = statement.split_once('(') else {
                return Err(Error::Misuse(format!(
                    "expected 'name(column definitions)', got '{statement}'"
                )));
            };
            let name = name.trim();
            if existing.iter().any(|table| table == name) {
                continue;
            }
            self.query(&format!("CREATE TABLE IF NOT EXISTS {statement}"), &[])?;
            info!(table = name, "created table");
            created += 1;
        }
        Ok(created)
    }
}

fn push_conditions(
    sql: &mut String,
    criteria: Option<&MatchCriteria>,
    exact_match: bool,
) -> Result<Vec<Value>> {
    match criteria {
        Some(criteria) => {
            let conditions = build_conditions(criteria, exact_match)?;
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.sql);
            Ok(conditions.params)
        }
        None => Ok(Vec::new()),
    }
}
