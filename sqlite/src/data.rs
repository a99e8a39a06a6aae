//! Data operations: counting, bulk insert, select, update, delete, vacuum.
//!
//! # Bulk insert chunking
//!
//! SQLite caps the number of bound parameters per statement. [`insert`]
//! splits its rows so that `rows_per_chunk * column_count` never exceeds
//! [`DatabaseConfig::max_variables`](crate::DatabaseConfig::max_variables),
//! issues one multi-row `INSERT` per chunk, and sums the affected counts.
//! The same statement builder renders literal `INSERT`s for data dumps.
//!
//! [`insert`]: Databased::insert

use databased_core::{Row, Value, quote_identifier, quote_identifier_list};
use tracing::info;

use crate::connection::Databased;
use crate::error::{Error, Result};
use crate::select::Select;

impl Databased {
    /// Counts rows of `table`, or non-null values of `column` when it is
    /// not `"*"`.
    ///
    /// `filter` is a raw WHERE condition. With `distinct`, counts distinct
    /// values of `column`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Misuse`] for a distinct count over `"*"`.
    pub fn count(
        &mut self,
        table: &str,
        column: &str,
        filter: Option<&str>,
        distinct: bool,
    ) -> Result<usize> {
        self.count_where(table, column, filter, &[], distinct)
    }

    /// Number of rows in `table`.
    pub fn count_rows(&mut self, table: &str) -> Result<usize> {
        self.count(table, "*", None, false)
    }

    pub(crate) fn count_where(
        &mut self,
        table: &str,
        column: &str,
        filter: Option<&str>,
        params: &[Value],
        distinct: bool,
    ) -> Result<usize> {
        let target = match (column, distinct) {
            ("*", true) => {
                return Err(Error::Misuse(
                    "a distinct count needs a column, not '*'".into(),
                ));
            }
            ("*", false) => "*".to_string(),
            (column, true) => format!("DISTINCT {}", quote_identifier(column)?),
            (column, false) => quote_identifier(column)?,
        };
        let mut sql = format!(
            "SELECT COUNT({target}) AS count FROM {}",
            quote_identifier(table)?
        );
        push_filter(&mut sql, filter);

        let rows = self.query(&sql, params)?;
        let count = rows
            .first()
            .and_then(|row| row.get_i64("count"))
            .unwrap_or_default();
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Inserts `rows` into `table` and returns the number of rows inserted.
    ///
    /// An empty `columns` slice means every column of the table, in
    /// declaration order. Rows are sent in chunks that respect the
    /// configured parameter ceiling. Errors, including constraint
    /// violations, propagate; chunks inserted before the failure stay in
    /// the pending transaction until commit or rollback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Misuse`] when a row's length differs from the
    /// column count, when the table has no columns, or when one row alone
    /// would exceed the parameter ceiling.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use databased_sqlite::{Databased, DatabaseConfig};
    /// # use databased_core::Value;
    /// # let mut db = Databased::new(DatabaseConfig::new("cereals.db")).unwrap();
    /// let inserted = db
    ///     .insert(
    ///         "cereals",
    ///         &["name", "brand"],
    ///         &[
    ///             vec![Value::from("Sugar Berries"), Value::from("Super Health")],
    ///             vec![Value::from("Shreddy Bois"), Value::from("Dr. Wheat")],
    ///         ],
    ///     )
    ///     .unwrap();
    /// assert_eq!(inserted, 2);
    /// ```
    pub fn insert<S: AsRef<str>>(
        &mut self,
        table: &str,
        columns: &[S],
        rows: &[Vec<Value>],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let columns: Vec<String> = if columns.is_empty() {
            self.get_columns(table)?
        } else {
            columns.iter().map(|c| c.as_ref().to_string()).collect()
        };
        if columns.is_empty() {
            return Err(Error::Misuse(format!("table '{table}' has no columns")));
        }
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(Error::Misuse(format!(
                "row {index} has {} values but {} columns were given",
                row.len(),
                columns.len()
            )));
        }

        let chunk_rows = rows_per_statement(self.config().max_variables, columns.len())?;
        let mut inserted = 0;
        for chunk in rows.chunks(chunk_rows) {
            let sql = insert_statement(table, &columns, chunk, |_| "?".to_string())?;
            let params: Vec<Value> = chunk.iter().flatten().cloned().collect();
            self.query(&sql, &params)?;
            inserted += self.affected_rows();
        }
        info!(table, rows = inserted, "inserted rows");
        Ok(inserted)
    }

    /// Runs a SELECT against `table` with the given options.
    ///
    /// `table` is placed verbatim after `FROM`, so it may carry an alias.
    /// Excluded columns are resolved against the table's current columns
    /// first.
    pub fn select(&mut self, table: &str, select: &Select) -> Result<Vec<Row>> {
        let sql = if select.exclude_columns().is_empty() {
            select.to_sql(table)?
        } else {
            select.validate()?;
            let available = self.get_columns(table)?;
            select.to_sql_excluding(table, &available)?
        };
        self.query(&sql, select.params())
    }

    /// Sets `column` to `value` in every row matching `filter`, or in every
    /// row of the table when `filter` is `None`. Returns the number of rows
    /// changed.
    pub fn update(
        &mut self,
        table: &str,
        column: &str,
        value: impl Into<Value>,
        filter: Option<&str>,
    ) -> Result<usize> {
        self.update_where(table, column, value.into(), filter, &[])
    }

    pub(crate) fn update_where(
        &mut self,
        table: &str,
        column: &str,
        value: Value,
        filter: Option<&str>,
        filter_params: &[Value],
    ) -> Result<usize> {
        let mut sql = format!(
            "UPDATE {} SET {} = ?",
            quote_identifier(table)?,
            quote_identifier(column)?
        );
        push_filter(&mut sql, filter);

        let mut params = Vec::with_capacity(filter_params.len() + 1);
        params.push(value);
        params.extend_from_slice(filter_params);
        self.query(&sql, &params)?;

        let updated = self.affected_rows();
        info!(table, column, rows = updated, "updated rows");
        Ok(updated)
    }

    /// Deletes every row matching `filter`, or every row of the table when
    /// `filter` is `None`. Returns the number of rows deleted.
    pub fn delete(&mut self, table: &str, filter: Option<&str>) -> Result<usize> {
        self.delete_where(table, filter, &[])
    }

    pub(crate) fn delete_where(
        &mut self,
        table: &str,
        filter: Option<&str>,
        params: &[Value],
    ) -> Result<usize> {
        let mut sql = format!("DELETE FROM {}", quote_identifier(table)?);
        push_filter(&mut sql, filter);
        self.query(&sql, params)?;

        let deleted = self.affected_rows();
        info!(table, rows = deleted, "deleted rows");
        Ok(deleted)
    }

    /// Rebuilds the database file and returns the number of bytes freed.
    ///
    /// Pending writes are committed first, since SQLite cannot vacuum
    /// inside a transaction. File sizes are read from the filesystem before
    /// and after; growth is reported as `0`.
    pub fn vacuum(&mut self) -> Result<u64> {
        if self.in_transaction() {
            self.commit()?;
        }
        let before = self.file_size()?;
        self.query("VACUUM", &[])?;
        let after = self.file_size()?;

        let freed = before.saturating_sub(after);
        info!(before, after, freed, "vacuumed database");
        Ok(freed)
    }

    fn file_size(&self) -> Result<u64> {
        let path = self.path();
        std::fs::metadata(path)
            .map(|meta| meta.len())
            .map_err(|e| Error::io(path, e))
    }
}

/// Rows per statement so that `rows * column_count <= max_variables`.
pub(crate) fn rows_per_statement(max_variables: usize, column_count: usize) -> Result<usize> {
    if column_count == 0 {
        return Err(Error::Misuse("an insert needs at least one column".into()));
    }
    match max_variables / column_count {
        0 => Err(Error::Misuse(format!(
            "{column_count} columns exceed the limit of {max_variables} parameters per statement"
        ))),
        rows => Ok(rows),
    }
}

/// Builds `INSERT INTO "t" ("a", "b") VALUES (..), (..)` for `rows`,
/// rendering each cell with `render` (a `?` placeholder or a literal).
pub(crate) fn insert_statement<R: AsRef<[Value]>>(
    table: &str,
    columns: &[String],
    rows: &[R],
    mut render: impl FnMut(&Value) -> String,
) -> Result<String> {
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let cells: Vec<String> = row.as_ref().iter().map(&mut render).collect();
            format!("({})", cells.join(", "))
        })
        .collect();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_identifier(table)?,
        quote_identifier_list(columns)?,
        tuples.join(", ")
    ))
}

fn push_filter(sql: &mut String, filter: Option<&str>) {
    if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    fn temp_db(max_variables: usize) -> (tempfile::TempDir, Databased) {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::new(dir.path().join("data.db")).with_max_variables(max_variables);
        let mut db = Databased::new(config).unwrap();
        db.create_table("t", &["a INTEGER", "b TEXT"]).unwrap();
        (dir, db)
    }

    #[test]
    fn test_rows_per_statement() {
        assert_eq!(rows_per_statement(900, 2).unwrap(), 450);
        assert_eq!(rows_per_statement(900, 7).unwrap(), 128);
        assert_eq!(rows_per_statement(900, 900).unwrap(), 1);
        assert!(matches!(rows_per_statement(900, 901), Err(Error::Misuse(_))));
        assert!(matches!(rows_per_statement(900, 0), Err(Error::Misuse(_))));
    }

    #[test]
    fn test_insert_statement_placeholders() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let rows = vec![vec![Value::from(1), Value::from("x")]; 2];
        let sql = insert_statement("t", &columns, &rows, |_| "?".to_string()).unwrap();
        assert_eq!(sql, r#"INSERT INTO "t" ("a", "b") VALUES (?, ?), (?, ?)"#);
    }

    #[test]
    fn test_insert_statement_literals() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let rows = vec![vec![Value::Null, Value::from("it's")]];
        let sql = insert_statement("t", &columns, &rows, Value::to_sql_literal).unwrap();
        assert_eq!(sql, r#"INSERT INTO "t" ("a", "b") VALUES (NULL, 'it''s')"#);
    }

    #[test]
    fn test_insert_chunks_with_small_ceiling() {
        let (_dir, mut db) = temp_db(5);
        let rows: Vec<Vec<Value>> = (0..7)
            .map(|i| vec![Value::from(i), Value::from(format!("row {i}"))])
            .collect();
        assert_eq!(db.insert("t", &["a", "b"], &rows).unwrap(), 7);
        assert_eq!(db.count_rows("t").unwrap(), 7);
    }

    #[test]
    fn test_insert_without_columns_uses_table_columns() {
        let (_dir, mut db) = temp_db(900);
        let empty: [&str; 0] = [];
        db.insert("t", &empty, &[vec![Value::from(1), Value::from("x")]])
            .unwrap();
        let rows = db.select("t", &Select::new()).unwrap();
        assert_eq!(rows[0].get_str("b"), Some("x"));
    }

    #[test]
    fn test_insert_rejects_ragged_rows() {
        let (_dir, mut db) = temp_db(900);
        let rows = vec![vec![Value::from(1), Value::from("x")], vec![Value::from(2)]];
        assert!(matches!(
            db.insert("t", &["a", "b"], &rows),
            Err(Error::Misuse(_))
        ));
        assert_eq!(db.count_rows("t").unwrap(), 0);
    }

    #[test]
    fn test_insert_nothing() {
        let (_dir, mut db) = temp_db(900);
        assert_eq!(db.insert("t", &["a"], &[]).unwrap(), 0);
    }

    #[test]
    fn test_count_variants() {
        let (_dir, mut db) = temp_db(900);
        let rows = vec![
            vec![Value::from(1), Value::from("x")],
            vec![Value::from(2), Value::from("x")],
            vec![Value::from(3), Value::Null],
        ];
        db.insert("t", &["a", "b"], &rows).unwrap();

        assert_eq!(db.count("t", "*", None, false).unwrap(), 3);
        assert_eq!(db.count("t", "b", None, false).unwrap(), 2);
        assert_eq!(db.count("t", "b", None, true).unwrap(), 1);
        assert_eq!(db.count("t", "*", Some("a > 1"), false).unwrap(), 2);
        assert!(matches!(
            db.count("t", "*", None, true),
            Err(Error::Misuse(_))
        ));
    }

    #[test]
    fn test_update_binds_value() {
        let (_dir, mut db) = temp_db(900);
        db.insert("t", &["a", "b"], &[vec![Value::from(1), Value::from("x")]])
            .unwrap();
        assert_eq!(db.update("t", "b", "it's \"quoted\"", None).unwrap(), 1);
        let rows = db.select("t", &Select::new().with_columns(["b"])).unwrap();
        assert_eq!(rows[0].get_str("b"), Some("it's \"quoted\""));
    }

    #[test]
    fn test_select_with_exclusions() {
        let (_dir, mut db) = temp_db(900);
        db.insert("t", &["a", "b"], &[vec![Value::from(1), Value::from("x")]])
            .unwrap();
        let rows = db
            .select("t", &Select::new().with_exclude_columns(["a"]))
            .unwrap();
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_vacuum_commits_pending_work() {
        let (_dir, mut db) = temp_db(900);
        db.insert("t", &["a", "b"], &[vec![Value::from(1), Value::from("x")]])
            .unwrap();
        assert!(db.in_transaction());
        db.vacuum().unwrap();
        assert!(!db.in_transaction());
        assert_eq!(db.count_rows("t").unwrap(), 1);
    }
}
