//! Schema and data dumps as re-executable SQL text.
//!
//! A dump is two independent files: one of `CREATE TABLE IF NOT EXISTS`
//! statements rebuilt from column introspection, and one of literal
//! multi-row `INSERT` statements. Restoring means running the schema file
//! and then the data file with
//! [`execute_script`](crate::Databased::execute_script).
//!
//! Cell rendering is lossless: `NULL` stays `NULL`, text keeps its quotes
//! (single quotes doubled), blobs use `X'..'`, and timestamp columns are
//! dumped as the text actually stored.
//!
//! Foreign keys, `AUTOINCREMENT`, `CHECK` and `UNIQUE` constraints are not
//! carried over: column introspection does not report them.

use std::path::Path;

use databased_core::{ColumnInfo, Value, quote_identifier, quote_identifier_list};
use tracing::info;

use crate::connection::Databased;
use crate::data::{insert_statement, rows_per_statement};
use crate::error::{Error, Result};

impl Databased {
    /// Renders `CREATE TABLE` statements for `tables`, or for every table
    /// when `None`.
    pub fn schema_sql(&mut self, tables: Option<&[&str]>) -> Result<String> {
        let mut sql = String::new();
        for table in self.dump_targets(tables)? {
            let columns = self.describe(&table)?;
            if columns.is_empty() {
                return Err(Error::Misuse(format!("no such table: '{table}'")));
            }
            sql.push_str(&create_table_statement(&table, &columns)?);
            sql.push_str("\n\n");
        }
        Ok(sql)
    }

    /// Renders literal `INSERT` statements holding every row of `tables`,
    /// or of every table when `None`.
    ///
    /// Rows are grouped with the same chunking as
    /// [`insert`](Self::insert), so each statement stays within the
    /// parameter ceiling if it is later converted back to bound form.
    pub fn data_sql(&mut self, tables: Option<&[&str]>) -> Result<String> {
        let max_variables = self.config().max_variables;
        let mut sql = String::new();
        for table in self.dump_targets(tables)? {
            let columns = self.get_columns(&table)?;
            if columns.is_empty() {
                return Err(Error::Misuse(format!("no such table: '{table}'")));
            }
            let select = format!(
                "SELECT {} FROM {}",
                quote_identifier_list(&columns)?,
                quote_identifier(&table)?
            );
            let rows: Vec<Vec<Value>> = self
                .query_raw(&select, &[])?
                .into_iter()
                .map(|row| row.into_values())
                .collect();

            for chunk in rows.chunks(rows_per_statement(max_variables, columns.len())?) {
                sql.push_str(&insert_statement(&table, &columns, chunk, Value::to_sql_literal)?);
                sql.push_str(";\n");
            }
        }
        Ok(sql)
    }

    /// Writes [`schema_sql`](Self::schema_sql) to `path`.
    pub fn dump_schema(&mut self, path: impl AsRef<Path>, tables: Option<&[&str]>) -> Result<()> {
        let path = path.as_ref();
        let sql = self.schema_sql(tables)?;
        std::fs::write(path, sql).map_err(|e| Error::io(path, e))?;
        info!(file = %path.display(), "dumped schema");
        Ok(())
    }

    /// Writes [`data_sql`](Self::data_sql) to `path`.
    pub fn dump_data(&mut self, path: impl AsRef<Path>, tables: Option<&[&str]>) -> Result<()> {
        let path = path.as_ref();
        let sql = self.data_sql(tables)?;
        std::fs::write(path, sql).map_err(|e| Error::io(path, e))?;
        info!(file = %path.display(), "dumped data");
        Ok(())
    }

    fn dump_targets(&mut self, tables: Option<&[&str]>) -> Result<Vec<String>> {
        match tables {
            Some(tables) => Ok(tables.iter().map(|t| t.to_string()).collect()),
            None => self.list_tables(),
        }
    }
}

/// One `CREATE TABLE IF NOT EXISTS` statement, a column per line.
fn create_table_statement(table: &str, columns: &[ColumnInfo]) -> Result<String> {
    let mut key: Vec<&ColumnInfo> = columns.iter().filter(|c| c.is_primary_key()).collect();
    key.sort_by_key(|c| c.primary_key);
    let inline_key = key.len() == 1;

    let mut lines = Vec::with_capacity(columns.len() + 1);
    for column in columns {
        let mut line = format!("    {}", quote_identifier(&column.name)?);
        if !column.declared_type.is_empty() {
            line.push(' ');
            line.push_str(&column.declared_type);
        }
        if inline_key && column.is_primary_key() {
            line.push_str(" PRIMARY KEY");
        }
        if column.not_null {
            line.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default_value {
            line.push_str(" DEFAULT ");
            line.push_str(&default_expression(default));
        }
        lines.push(line);
    }
    if key.len() > 1 {
        let names = key
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        lines.push(format!("    PRIMARY KEY ({})", names.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        quote_identifier(table)?,
        lines.join(",\n")
    ))
}

/// Literals go in as-is; anything else is an expression and needs parens.
fn default_expression(default: &str) -> String {
    let trimmed = default.trim();
    let upper = trimmed.to_ascii_uppercase();
    let literal = trimmed.starts_with('\'')
        || trimmed.starts_with('(')
        || upper.starts_with("X'")
        || trimmed.parse::<f64>().is_ok()
        || matches!(
            upper.as_str(),
            "NULL" | "TRUE" | "FALSE" | "CURRENT_TIME" | "CURRENT_DATE" | "CURRENT_TIMESTAMP"
        );
    if literal {
        trimmed.to_string()
    } else {
        format!("({trimmed})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    fn column(position: i64, name: &str, ty: &str, pk: i64) -> ColumnInfo {
        ColumnInfo {
            position,
            name: name.into(),
            declared_type: ty.into(),
            not_null: false,
            default_value: None,
            primary_key: pk,
        }
    }

    #[test]
    fn test_single_column_key_is_inline() {
        let mut name = column(1, "name", "TEXT", 0);
        name.not_null = true;
        let sql = create_table_statement("cereals", &[column(0, "id", "INTEGER", 1), name]).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"cereals\" (\n    \"id\" INTEGER PRIMARY KEY,\n    \"name\" TEXT NOT NULL\n);"
        );
    }

    #[test]
    fn test_composite_key_is_table_level() {
        let columns = [
            column(0, "b", "TEXT", 2),
            column(1, "a", "TEXT", 1),
            column(2, "v", "", 0),
        ];
        let sql = create_table_statement("pairs", &columns).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"pairs\" (\n    \"b\" TEXT,\n    \"a\" TEXT,\n    \"v\",\n    PRIMARY KEY (\"a\", \"b\")\n);"
        );
    }

    #[test]
    fn test_default_expressions() {
        assert_eq!(default_expression("'none'"), "'none'");
        assert_eq!(default_expression("0"), "0");
        assert_eq!(default_expression("-1.5"), "-1.5");
        assert_eq!(default_expression("CURRENT_TIMESTAMP"), "CURRENT_TIMESTAMP");
        assert_eq!(default_expression("datetime('now')"), "(datetime('now'))");
    }

    #[test]
    fn test_data_sql_renders_literals() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Databased::new(DatabaseConfig::new(dir.path().join("dump.db"))).unwrap();
        db.create_table("t", &["a INTEGER", "b TEXT", "c BLOB"]).unwrap();
        db.insert(
            "t",
            &["a", "b", "c"],
            &[vec![Value::from(1), Value::from("say \"hi\"; it's"), Value::Blob(vec![0xAB])]],
        )
        .unwrap();
        db.insert("t", &["a"], &[vec![Value::from(2)]]).unwrap();

        let sql = db.data_sql(Some(&["t"][..])).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"t\" (\"a\", \"b\", \"c\") VALUES (1, 'say \"hi\"; it''s', X'AB'), (2, NULL, NULL);\n"
        );
    }

    #[test]
    fn test_data_sql_keeps_stored_timestamp_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Databased::new(DatabaseConfig::new(dir.path().join("dump.db"))).unwrap();
        assert!(db.detect_types());
        db.create_table("events", &["at TIMESTAMP"]).unwrap();
        db.insert(
            "events",
            &["at"],
            &[
                vec![Value::from("2024-01-01T00:00:00")],
                vec![Value::from("2024-01-02 03:04:05.5")],
            ],
        )
        .unwrap();

        let sql = db.data_sql(None).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"events\" (\"at\") VALUES ('2024-01-01T00:00:00'), ('2024-01-02 03:04:05.5');\n"
        );

        let rows = db.query("SELECT at FROM events", &[]).unwrap();
        assert!(matches!(rows[0].get("at"), Some(Value::Timestamp(_))));
    }

    #[test]
    fn test_unknown_table_is_misuse() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Databased::new(DatabaseConfig::new(dir.path().join("dump.db"))).unwrap();
        assert!(matches!(db.schema_sql(Some(&["nope"][..])), Err(Error::Misuse(_))));
    }
}
