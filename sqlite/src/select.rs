//! SELECT statement assembly.
//!
//! [`Select`] collects the optional clauses of a query and renders them in
//! canonical order: `SELECT`, `FROM`, `JOIN`, `WHERE`, `GROUP BY`,
//! `HAVING`, `ORDER BY`, `LIMIT`. Clause bodies are raw SQL supplied by the
//! caller; values used in them should be bound with [`Select::bind`].
//!
//! # Example
//!
//! ```
//! use databased_sqlite::Select;
//!
//! let select = Select::new()
//!     .with_columns(["brand", "COUNT(*) AS n"])
//!     .with_filter("name LIKE ?")
//!     .bind("%Berr%")
//!     .with_group_by("brand")
//!     .with_order_by("n DESC")
//!     .with_limit(5);
//! assert_eq!(
//!     select.to_sql("cereals").unwrap(),
//!     "SELECT brand, COUNT(*) AS n FROM cereals WHERE name LIKE ? \
//!      GROUP BY brand ORDER BY n DESC LIMIT 5"
//! );
//! ```

use databased_core::{Value, quote_identifier};

use crate::error::{Error, Result};

/// Options for [`Databased::select`](crate::Databased::select).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    columns: Vec<String>,
    joins: Vec<String>,
    filter: Option<String>,
    group_by: Option<String>,
    having: Option<String>,
    order_by: Option<String>,
    limit: Option<u64>,
    exclude_columns: Vec<String>,
    params: Vec<Value>,
}

impl Select {
    /// A `SELECT *` with no clauses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Result expressions; `*` when never set.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Appends a join clause, e.g. `"INNER JOIN brands ON brands.id = cereals.brand_id"`.
    pub fn with_join(mut self, join: impl Into<String>) -> Self {
        self.joins.push(join.into());
        self
    }

    /// Sets the WHERE condition.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    /// Sets the HAVING condition. Requires a GROUP BY.
    pub fn with_having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Selects every column of the table except these.
    ///
    /// Resolving the remaining columns needs one introspection query, so
    /// this only works when the select target is a plain table or view
    /// name. Cannot be combined with [`with_columns`](Self::with_columns).
    pub fn with_exclude_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Binds the next positional `?` placeholder in the filter or having
    /// clause.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn exclude_columns(&self) -> &[String] {
        &self.exclude_columns
    }

    /// Rejects option combinations that cannot form a valid statement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Misuse`] when both explicit columns and excluded
    /// columns are given, or when HAVING is set without GROUP BY.
    pub fn validate(&self) -> Result<()> {
        if !self.columns.is_empty() && !self.exclude_columns.is_empty() {
            return Err(Error::Misuse(
                "select columns and excluded columns are mutually exclusive".into(),
            ));
        }
        if self.having.is_some() && self.group_by.is_none() {
            return Err(Error::Misuse("HAVING requires GROUP BY".into()));
        }
        Ok(())
    }

    /// Renders the statement for `table` using the configured columns.
    ///
    /// Excluded columns cannot be resolved without a connection; use
    /// [`Databased::select`](crate::Databased::select) for those.
    pub fn to_sql(&self, table: &str) -> Result<String> {
        self.validate()?;
        if !self.exclude_columns.is_empty() {
            return Err(Error::Misuse(
                "excluded columns must be resolved against a live table".into(),
            ));
        }
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        Ok(self.render(table, &columns))
    }

    /// Renders the statement with `available` minus the excluded columns.
    pub(crate) fn to_sql_excluding(&self, table: &str, available: &[String]) -> Result<String> {
        self.validate()?;
        let kept: Vec<&String> = available
            .iter()
            .filter(|column| !self.exclude_columns.contains(column))
            .collect();
        if kept.is_empty() {
            return Err(Error::Misuse(format!(
                "excluding {:?} leaves no columns of '{table}' to select",
                self.exclude_columns
            )));
        }
        let columns = kept
            .into_iter()
            .map(|column| quote_identifier(column))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(self.render(table, &columns.join(", ")))
    }

    fn render(&self, table: &str, columns: &str) -> String {
        let mut sql = format!("SELECT {columns} FROM {table}");
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        if let Some(group_by) = &self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group_by);
        }
        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(having);
        }
        if let Some(order_by) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql
    }
}
