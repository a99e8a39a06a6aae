//! Connection lifecycle and the query executor.
//!
//! [`Databased`] owns at most one [`rusqlite::Connection`]. Every statement
//! reaches the engine through [`Databased::query`] (or, for multi-statement
//! scripts, [`Databased::execute_script`]); both open the connection on
//! demand, so callers never have to call [`connect`](Databased::connect)
//! themselves.
//!
//! # Transactions
//!
//! Data-modifying statements (`INSERT`, `UPDATE`, `DELETE`, `REPLACE`,
//! and writes behind a `WITH` clause or leading comments) implicitly open a transaction when none is active. Pending work is
//! flushed by [`commit`](Databased::commit), or by
//! [`close`](Databased::close) when `commit_on_close` is set; closing
//! without committing rolls it back. Schema statements run in autocommit
//! mode unless a transaction is already open.
//!
//! # Example
//!
//! ```no_run
//! use databased_sqlite::{Databased, DatabaseConfig};
//!
//! let mut db = Databased::new(DatabaseConfig::new("cereals.db")).unwrap();
//! let rows = db.query("SELECT name FROM sqlite_master", &[]).unwrap();
//! println!("{} schema objects", rows.len());
//! db.close().unwrap();
//! ```

use std::fs::OpenOptions;
use std::path::Path;
use std::time::Duration;

use databased_core::{Row, Value};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, params_from_iter};
use tracing::{debug, info, warn};

use crate::config::{DatabaseConfig, check_timeout};
use crate::error::{Error, Result};

/// An open connection plus the options captured when it was opened.
struct Session {
    conn: Connection,
    detect_types: bool,
}

/// SQLite convenience layer: one database file, one lazily-opened
/// connection.
///
/// Not safe to share between threads; the connection and the affected-row
/// counter are mutated by every call.
///
/// Dropping a `Databased` closes its connection with the same commit rule
/// as [`close`](Self::close), so the connection is released on every exit
/// path, including early returns through `?`.
pub struct Databased {
    config: DatabaseConfig,
    session: Option<Session>,
    affected_rows: usize,
}

impl Databased {
    /// Creates a manager for `config.path`.
    ///
    /// The database file and any missing parent directories are created
    /// immediately; the connection itself is opened lazily.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for out-of-range options and [`Error::Io`]
    /// if the file or its directories cannot be created.
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        ensure_database_file(&config.path)?;
        Ok(Self {
            config,
            session: None,
            affected_rows: 0,
        })
    }

    /// Opens a manager, connects, runs `f`, and closes again.
    ///
    /// The connection is closed whether `f` succeeds or fails. An error
    /// from `f` takes precedence over an error from closing.
    pub fn scoped<T>(
        config: DatabaseConfig,
        f: impl FnOnce(&mut Databased) -> Result<T>,
    ) -> Result<T> {
        let mut db = Databased::new(config)?;
        db.connect()?;
        let outcome = f(&mut db);
        let closed = db.close();
        let value = outcome?;
        closed?;
        Ok(value)
    }

    /// Opens the connection.
    ///
    /// Applies the busy timeout and the foreign-key pragma, and captures
    /// the type-detection flag for the lifetime of the connection. Calling
    /// this while already connected is a no-op; the existing connection
    /// and any pending transaction are kept.
    pub fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let path = &self.config.path;
        let conn = Connection::open(path).map_err(|source| Error::Open {
            path: path.clone(),
            source,
        })?;
        conn.busy_timeout(self.config.timeout())?;
        apply_foreign_keys(&conn, self.config.enforce_foreign_keys)?;
        self.session = Some(Session {
            conn,
            detect_types: self.config.detect_types,
        });
        debug!(path = %path.display(), "connected");
        Ok(())
    }

    /// Closes the connection, committing first when `commit_on_close` is
    /// set and rolling back otherwise. A no-op when disconnected.
    pub fn close(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        if !session.conn.is_autocommit() {
            if self.config.commit_on_close {
                session.conn.execute_batch("COMMIT")?;
            } else {
                session.conn.execute_batch("ROLLBACK")?;
                debug!("rolled back uncommitted work on close");
            }
        }
        session.conn.close().map_err(|(_, e)| Error::from(e))?;
        debug!(path = %self.config.path.display(), "disconnected");
        Ok(())
    }

    /// Alias for [`close`](Self::close).
    pub fn disconnect(&mut self) -> Result<()> {
        self.close()
    }

    /// Commits pending writes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when there is no open connection:
    /// a commit that silently does nothing could hide lost writes.
    pub fn commit(&mut self) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NotConnected)?;
        if !session.conn.is_autocommit() {
            session.conn.execute_batch("COMMIT")?;
            debug!("committed");
        }
        Ok(())
    }

    /// Discards pending writes. A no-op when disconnected or when no
    /// transaction is open.
    pub fn rollback(&mut self) -> Result<()> {
        if let Some(session) = &self.session {
            if !session.conn.is_autocommit() {
                session.conn.execute_batch("ROLLBACK")?;
                debug!("rolled back");
            }
        }
        Ok(())
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Whether an implicit or explicit transaction is pending.
    pub fn in_transaction(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.conn.is_autocommit())
    }

    /// Executes one SQL statement with positional parameters and returns
    /// every result row.
    ///
    /// Opens the connection first if needed. Only identifiers may be
    /// interpolated into `sql`; values belong in `params`. Statements
    /// without a result set return an empty vector; the number of rows
    /// they changed is available from [`affected_rows`](Self::affected_rows).
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.run_statement(sql, params, true)
    }

    /// Like [`query`](Self::query), but cells come back exactly as stored:
    /// timestamp columns are never decoded.
    pub(crate) fn query_raw(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.run_statement(sql, params, false)
    }

    fn run_statement(
        &mut self,
        sql: &str,
        params: &[Value],
        decode_timestamps: bool,
    ) -> Result<Vec<Row>> {
        self.connect()?;
        self.affected_rows = 0;
        let Some(session) = self.session.as_ref() else {
            return Err(Error::NotConnected);
        };
        let conn = &session.conn;
        debug!(sql, params = params.len(), "executing");

        let mut stmt = conn.prepare(sql)?;
        let modifies_rows = !stmt.readonly() && is_data_modification(sql);
        if conn.is_autocommit() && modifies_rows {
            conn.execute_batch("BEGIN")?;
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let timestamp_columns: Vec<bool> = if decode_timestamps && session.detect_types {
            stmt.columns()
                .iter()
                .map(|column| column.decl_type().is_some_and(is_timestamp_type))
                .collect()
        } else {
            vec![false; columns.len()]
        };

        let mut results = Vec::new();
        let mut rows = stmt.query(params_from_iter(params.iter().map(to_engine_value)))?;
        while let Some(row) = rows.next()? {
            let mut record = Row::with_capacity(columns.len());
            for (index, name) in columns.iter().enumerate() {
                let value = from_engine_value(row.get_ref(index)?, timestamp_columns[index]);
                record.insert(name.clone(), value);
            }
            results.push(record);
        }
        drop(rows);

        if modifies_rows {
            self.affected_rows = conn.changes() as usize;
        }
        Ok(results)
    }

    /// Executes a `.sql` file containing any number of statements.
    ///
    /// Used to replay schema and data dumps.
    pub fn execute_script(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let script = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        self.execute_batch(&script)?;
        info!(script = %path.display(), "executed script");
        Ok(())
    }

    /// Executes a string of semicolon-separated statements.
    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.connect()?;
        let Some(session) = self.session.as_ref() else {
            return Err(Error::NotConnected);
        };
        debug!(bytes = sql.len(), "executing batch");
        session.conn.execute_batch(sql)?;
        self.affected_rows = 0;
        Ok(())
    }

    /// Rows changed by the most recent data-modifying statement executed
    /// through [`query`](Self::query); `0` after a read.
    pub fn affected_rows(&self) -> usize {
        self.affected_rows
    }

    /// Rowid of the most recent successful insert on this connection.
    pub fn last_insert_rowid(&self) -> Option<i64> {
        self.session
            .as_ref()
            .map(|session| session.conn.last_insert_rowid())
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Database name: the file name without its extension.
    pub fn name(&self) -> String {
        self.config
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Sets the lock wait. Takes effect on the next connect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for waits longer than
    /// [`MAX_TIMEOUT_SECS`](crate::MAX_TIMEOUT_SECS); the previous value is
    /// kept.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let secs = timeout.as_secs_f64();
        check_timeout(secs)?;
        self.config.timeout_secs = secs;
        Ok(())
    }

    pub fn detect_types(&self) -> bool {
        self.config.detect_types
    }

    /// Toggles timestamp decoding. Takes effect on the next connect.
    pub fn set_detect_types(&mut self, detect_types: bool) {
        self.config.detect_types = detect_types;
    }

    /// The last value set, whether or not a connection is open.
    pub fn enforce_foreign_keys(&self) -> bool {
        self.config.enforce_foreign_keys
    }

    /// Toggles foreign-key enforcement, re-issuing the pragma immediately
    /// when connected.
    ///
    /// SQLite ignores this pragma inside an open transaction; in that case
    /// the new setting applies once the transaction ends and the manager
    /// reconnects.
    pub fn set_enforce_foreign_keys(&mut self, enforce: bool) -> Result<()> {
        self.config.enforce_foreign_keys = enforce;
        if let Some(session) = &self.session {
            apply_foreign_keys(&session.conn, enforce)?;
        }
        Ok(())
    }

    pub fn commit_on_close(&self) -> bool {
        self.config.commit_on_close
    }

    pub fn set_commit_on_close(&mut self, commit_on_close: bool) {
        self.config.commit_on_close = commit_on_close;
    }
}

impl Drop for Databased {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.config.path.display(), error = %err, "failed to close database");
        }
    }
}

impl std::fmt::Debug for Databased {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Databased")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .field("affected_rows", &self.affected_rows)
            .finish()
    }
}

/// Creates the database file and its parent directories if missing.
fn ensure_database_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    Ok(())
}

fn apply_foreign_keys(conn: &Connection, enforce: bool) -> Result<()> {
    let state = if enforce { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {state};"))?;
    Ok(())
}

/// Whether `sql` is a data-modifying statement: it runs inside an implicit
/// transaction and reports an affected-row count. `WITH` counts too; callers
/// rule out read-only CTEs with `Statement::readonly`.
fn is_data_modification(sql: &str) -> bool {
    matches!(
        leading_keyword(sql).as_str(),
        "INSERT" | "UPDATE" | "DELETE" | "REPLACE" | "WITH"
    )
}

/// First keyword of `sql`, upper-cased, after whitespace and comments.
fn leading_keyword(sql: &str) -> String {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.find('\n').map_or("", |i| &after[i + 1..]).trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map_or("", |i| &after[i + 2..]).trim_start();
        } else {
            break;
        }
    }
    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase()
}

fn is_timestamp_type(decl_type: &str) -> bool {
    let upper = decl_type.trim().to_ascii_uppercase();
    upper == "TIMESTAMP" || upper == "DATETIME"
}

fn to_engine_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Engine;
    match value {
        Value::Null => Engine::Null,
        Value::Integer(v) => Engine::Integer(*v),
        Value::Real(v) => Engine::Real(*v),
        Value::Text(v) => Engine::Text(v.clone()),
        Value::Blob(v) => Engine::Blob(v.clone()),
        Value::Timestamp(ts) => {
            Engine::Text(ts.format(databased_core::TIMESTAMP_FORMAT).to_string())
        }
    }
}

fn from_engine_value(value: ValueRef<'_>, timestamp_column: bool) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if timestamp_column {
                if let Some(ts) = Value::parse_timestamp(&text) {
                    return Value::Timestamp(ts);
                }
            }
            Value::Text(text)
        }
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}
