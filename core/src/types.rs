//! Cell, row, and column types shared by the manager and its front ends.
//!
//! Every query result is a sequence of [`Row`] values, and every cell in a
//! row is a [`Value`]. The set of cell variants is closed, so dump rendering
//! and display code can match exhaustively.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Write as _};

use chrono::NaiveDateTime;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Format used to store and render [`Value::Timestamp`] cells.
///
/// Fractional seconds are only written when non-zero, which matches the
/// text SQLite's own `datetime()` family produces for whole seconds.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Alternate ISO-8601 layout accepted when parsing timestamps.
const TIMESTAMP_FORMAT_ISO: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A single cell value.
///
/// # Examples
///
/// ```
/// use databased_core::Value;
///
/// assert_eq!(Value::from(42).to_sql_literal(), "42");
/// assert_eq!(Value::from("it's").to_sql_literal(), "'it''s'");
/// assert_eq!(Value::Null.to_sql_literal(), "NULL");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// SQL `NULL` (also the value of an absent cell).
    #[default]
    Null,
    /// 64-bit signed integer. Booleans are stored as `0`/`1`.
    Integer(i64),
    /// Double-precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// Date and time without zone, decoded from `TIMESTAMP`/`DATETIME`
    /// columns when type detection is enabled.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` for numeric variants, which render unquoted.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_))
    }

    /// Returns the integer payload, if this is an integer cell.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text payload, if this is a text cell.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Parses timestamp text in either `YYYY-MM-DD HH:MM:SS[.ffffff]` or
    /// the `T`-separated ISO layout.
    pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
        let text = text.trim();
        NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT_ISO))
            .ok()
    }

    /// Renders the value as a literal that SQLite will read back as the
    /// same value.
    ///
    /// Numbers are unquoted, text and timestamps are single-quoted with
    /// embedded quotes doubled, blobs use `X'..'` hex notation.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => real_literal(*v),
            Value::Text(v) => quote_text(v),
            Value::Blob(bytes) => format!("X'{}'", hex_upper(bytes)),
            Value::Timestamp(ts) => quote_text(&ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }
}

fn real_literal(v: f64) -> String {
    if v.is_nan() {
        // SQLite stores NaN as NULL.
        "NULL".to_string()
    } else if v.is_infinite() {
        let literal = if v > 0.0 { "9e999" } else { "-9e999" };
        literal.to_string()
    } else {
        // Debug keeps a trailing ".0" so the literal stays REAL.
        format!("{v:?}")
    }
}

fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn hex_upper(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut hex, "{byte:02X}");
    }
    hex
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Blob(bytes) => write!(f, "x'{}'", hex_upper(bytes).to_lowercase()),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One result row: column names mapped to cell values.
///
/// Keys are unique and keep the order in which the engine reported the
/// columns. Inserting an existing key replaces its value in place.
///
/// # Examples
///
/// ```
/// use databased_core::{Row, Value};
///
/// let mut row = Row::new();
/// row.insert("name", "Sugar Berries");
/// row.insert("id", 1);
///
/// assert_eq!(row.columns().collect::<Vec<_>>(), vec!["name", "id"]);
/// assert_eq!(row.get("id"), Some(&Value::Integer(1)));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty row with room for `capacity` columns.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Sets `column` to `value`, keeping the original position when the
    /// column is already present.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Looks up a cell by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Looks up a text cell by column name.
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    /// Looks up an integer cell by column name.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Cell values in column order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    /// `(column, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Consumes the row, returning just the values.
    pub fn into_values(self) -> Vec<Value> {
        self.entries.into_iter().map(|(_, value)| value).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, value) in &self.entries {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Column descriptor obtained from table introspection.
///
/// Mirrors one row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// Zero-based position in the table.
    pub position: i64,
    /// Column name.
    pub name: String,
    /// Declared type as written in the table definition (may be empty).
    pub declared_type: String,
    /// Whether the column carries a `NOT NULL` constraint.
    pub not_null: bool,
    /// Default value expression as SQL text, if any.
    pub default_value: Option<String>,
    /// 1-based position within the primary key, 0 when not part of it.
    pub primary_key: i64,
}

impl ColumnInfo {
    /// Returns `true` if the column is part of the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.primary_key > 0
    }
}

/// Ordered `(column, value)` pairs used to filter rows.
///
/// Criteria are always combined conjunctively; order does not affect the
/// set of matched rows.
///
/// # Examples
///
/// ```
/// use databased_core::MatchCriteria;
///
/// let criteria = MatchCriteria::new().with("name", "Bob").with("state", "Alaska");
/// assert_eq!(criteria.len(), 2);
///
/// let from_pairs = MatchCriteria::from(vec![("name", "Bob")]);
/// assert!(!from_pairs.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchCriteria {
    pairs: Vec<(String, Value)>,
}

impl MatchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `(column, value)` pair.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.pairs.push((column.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.pairs.iter().map(|(column, value)| (column.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> From<Vec<(K, V)>> for MatchCriteria {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> From<BTreeMap<K, V>> for MatchCriteria {
    fn from(map: BTreeMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> From<HashMap<K, V>> for MatchCriteria {
    fn from(map: HashMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MatchCriteria {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut criteria = MatchCriteria::new();
        for (column, value) in iter {
            criteria.push(column, value);
        }
        criteria
    }
}
