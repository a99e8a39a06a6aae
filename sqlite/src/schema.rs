//! Schema operations: tables, columns, and catalog introspection.
//!
//! Creation is idempotent and dropping a missing table is tolerated
//! (reported as `false`). Column and rename operations propagate every
//! engine error, since a failed add or rename is rarely intentional.

use databased_core::{ColumnInfo, Row, Value, quote_identifier};
use tracing::{info, warn};

use crate::connection::Databased;
use crate::error::{Error, Result};

impl Databased {
    /// Creates `table` with the given column definitions unless it exists.
    ///
    /// Each definition is raw SQL, e.g. `"id INTEGER PRIMARY KEY"` or
    /// `"brand TEXT DEFAULT 'none'"`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use databased_sqlite::{Databased, DatabaseConfig};
    /// # let mut db = Databased::new(DatabaseConfig::new("cereals.db")).unwrap();
    /// db.create_table(
    ///     "cereals",
    ///     &["id INTEGER PRIMARY KEY", "name TEXT NOT NULL", "brand TEXT"],
    /// )
    /// .unwrap();
    /// ```
    pub fn create_table<S: AsRef<str>>(&mut self, table: &str, column_defs: &[S]) -> Result<()> {
        if column_defs.is_empty() {
            return Err(Error::Misuse(format!(
                "table '{table}' needs at least one column definition"
            )));
        }
        let defs: Vec<&str> = column_defs.iter().map(AsRef::as_ref).collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {}({})",
            quote_identifier(table)?,
            defs.join(", ")
        );
        self.query(&sql, &[])?;
        info!(table, "created table");
        Ok(())
    }

    /// Drops `table`. Returns `false` (and logs) instead of failing when
    /// the engine refuses, e.g. because the table does not exist.
    ///
    /// Connection failures still propagate.
    pub fn drop_table(&mut self, table: &str) -> Result<bool> {
        let sql = format!("DROP TABLE {}", quote_identifier(table)?);
        self.connect()?;
        match self.query(&sql, &[]) {
            Ok(_) => {
                info!(table, "dropped table");
                Ok(true)
            }
            Err(err) => {
                warn!(table, error = %err, "failed to drop table");
                Ok(false)
            }
        }
    }

    /// Adds a column from a raw definition such as `"rating REAL DEFAULT 0"`.
    pub fn add_column(&mut self, table: &str, column_def: &str) -> Result<()> {
        if column_def.trim().is_empty() {
            return Err(Error::Misuse("column definition cannot be empty".into()));
        }
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {column_def}",
            quote_identifier(table)?
        );
        self.query(&sql, &[])?;
        info!(table, column_def, "added column");
        Ok(())
    }

    pub fn drop_column(&mut self, table: &str, column: &str) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_identifier(table)?,
            quote_identifier(column)?
        );
        self.query(&sql, &[])?;
        info!(table, column, "dropped column");
        Ok(())
    }

    pub fn rename_column(&mut self, table: &str, column: &str, new_name: &str) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_identifier(table)?,
            quote_identifier(column)?,
            quote_identifier(new_name)?
        );
        self.query(&sql, &[])?;
        info!(table, column, new_name, "renamed column");
        Ok(())
    }

    pub fn rename_table(&mut self, table: &str, new_name: &str) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_identifier(table)?,
            quote_identifier(new_name)?
        );
        self.query(&sql, &[])?;
        info!(table, new_name, "renamed table");
        Ok(())
    }

    /// User table names, excluding SQLite's internal `sqlite_*` tables.
    pub fn list_tables(&mut self) -> Result<Vec<String>> {
        self.catalog_names("table")
    }

    pub fn list_views(&mut self) -> Result<Vec<String>> {
        self.catalog_names("view")
    }

    /// Index names, excluding automatic `sqlite_autoindex_*` entries.
    pub fn list_indices(&mut self) -> Result<Vec<String>> {
        self.catalog_names("index")
    }

    /// Column descriptors for a table or view, in declaration order.
    /// Empty when no such table exists.
    pub fn describe(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        let sql = format!("PRAGMA table_info({})", quote_identifier(table)?);
        self.query(&sql, &[])?
            .iter()
            .map(column_info_from_row)
            .collect()
    }

    /// Column names for a table or view, in declaration order.
    pub fn get_columns(&mut self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .describe(table)?
            .into_iter()
            .map(|column| column.name)
            .collect())
    }

    fn catalog_names(&mut self, kind: &str) -> Result<Vec<String>> {
        let rows = self.query(
            "SELECT name FROM sqlite_master WHERE type = ? AND substr(name, 1, 7) <> 'sqlite_' ORDER BY rowid",
            &[Value::from(kind)],
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get_str("name").map(str::to_owned))
            .collect())
    }
}

fn column_info_from_row(row: &Row) -> Result<ColumnInfo> {
    let name = row
        .get_str("name")
        .ok_or_else(|| Error::Misuse("table_info row is missing its name".into()))?;
    Ok(ColumnInfo {
        position: row.get_i64("cid").unwrap_or_default(),
        name: name.to_string(),
        declared_type: row.get_str("type").unwrap_or_default().to_string(),
        not_null: row.get_i64("notnull").unwrap_or_default() != 0,
        default_value: match row.get("dflt_value") {
            Some(Value::Null) | None => None,
            Some(value) => Some(value.to_string()),
        },
        primary_key: row.get_i64("pk").unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    fn temp_db() -> (tempfile::TempDir, Databased) {
        let dir = tempfile::tempdir().unwrap();
        let db = Databased::new(DatabaseConfig::new(dir.path().join("schema.db"))).unwrap();
        (dir, db)
    }

    #[test]
    fn test_create_table_requires_columns() {
        let (_dir, mut db) = temp_db();
        let empty: [&str; 0] = [];
        assert!(matches!(db.create_table("t", &empty), Err(Error::Misuse(_))));
    }

    #[test]
    fn test_describe_reports_constraints() {
        let (_dir, mut db) = temp_db();
        db.create_table(
            "cereals",
            &[
                "id INTEGER PRIMARY KEY",
                "name TEXT NOT NULL",
                "brand TEXT DEFAULT 'generic'",
            ],
        )
        .unwrap();

        let columns = db.describe("cereals").unwrap();
        assert_eq!(columns.len(), 3);
        assert!(columns[0].is_primary_key());
        assert_eq!(columns[0].declared_type, "INTEGER");
        assert!(columns[1].not_null);
        assert_eq!(columns[2].default_value.as_deref(), Some("'generic'"));
        assert_eq!(columns[2].position, 2);
    }

    #[test]
    fn test_describe_missing_table_is_empty() {
        let (_dir, mut db) = temp_db();
        assert!(db.describe("nope").unwrap().is_empty());
    }

    #[test]
    fn test_drop_missing_table_returns_false() {
        let (_dir, mut db) = temp_db();
        assert!(!db.drop_table("nope").unwrap());
        db.create_table("t", &["a"]).unwrap();
        assert!(db.drop_table("t").unwrap());
        assert!(db.list_tables().unwrap().is_empty());
    }

    #[test]
    fn test_add_duplicate_column_propagates() {
        let (_dir, mut db) = temp_db();
        db.create_table("t", &["a TEXT"]).unwrap();
        db.add_column("t", "b INTEGER").unwrap();
        assert!(db.add_column("t", "b INTEGER").is_err());
        assert_eq!(db.get_columns("t").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_column_rename_and_drop() {
        let (_dir, mut db) = temp_db();
        db.create_table("t", &["a TEXT", "b TEXT"]).unwrap();
        db.rename_column("t", "b", "c").unwrap();
        assert_eq!(db.get_columns("t").unwrap(), vec!["a", "c"]);
        db.drop_column("t", "c").unwrap();
        assert_eq!(db.get_columns("t").unwrap(), vec!["a"]);
        assert!(db.rename_column("t", "zzz", "y").is_err());
    }

    #[test]
    fn test_catalog_listing_excludes_internal_names() {
        let (_dir, mut db) = temp_db();
        db.create_table("items", &["id INTEGER PRIMARY KEY AUTOINCREMENT", "sku TEXT UNIQUE"])
            .unwrap();
        db.query("CREATE VIEW item_skus AS SELECT sku FROM items", &[])
            .unwrap();
        db.query("CREATE INDEX idx_items_sku ON items(sku)", &[])
            .unwrap();

        assert_eq!(db.list_tables().unwrap(), vec!["items"]);
        assert_eq!(db.list_views().unwrap(), vec!["item_skus"]);
        assert_eq!(db.list_indices().unwrap(), vec!["idx_items_sku"]);
    }

    #[test]
    fn test_names_resembling_the_reserved_prefix_are_listed() {
        let (_dir, mut db) = temp_db();
        db.create_table("sqlitebrowser_notes", &["note TEXT"]).unwrap();
        db.create_table("sqlites", &["n INTEGER"]).unwrap();
        db.insert("sqlitebrowser_notes", &["note"], &[vec![Value::from("keep me")]])
            .unwrap();

        assert_eq!(db.list_tables().unwrap(), vec!["sqlitebrowser_notes", "sqlites"]);
        assert!(db.schema_sql(None).unwrap().contains("\"sqlitebrowser_notes\""));
        assert_eq!(
            db.data_sql(None).unwrap(),
            "INSERT INTO \"sqlitebrowser_notes\" (\"note\") VALUES ('keep me');\n"
        );
    }
}
