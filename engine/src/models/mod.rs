//! Domain models for the reconciliation engine.
//!
//! - [`Value`] - A single cell, with one unambiguous missing sentinel
//! - [`Table`] - Ordered columns plus rows aligned with them
//! - [`metadata`] - Per-variable conversion and aggregation metadata

pub mod metadata;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

pub use metadata::{parse_variable_comment, AggregationFunction, VariableMetadata};

/// Date format used for reading and writing date cells.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time-of-day format used for writing time cells.
pub const TIME_FORMAT: &str = "%H:%M:%S";

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

static MISSING: Value = Value::Missing;

// =============================================================================
// Value
// =============================================================================

/// A scalar cell value.
///
/// `Missing` is the only "no data" sentinel. It is distinct from `Number(0.0)`
/// and from `Text("")`. Values are hashable and totally ordered so they can be
/// used as key parts; `Missing` equals itself and sorts after everything else.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Missing,
    Number(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Build a number, mapping non-finite input to `Missing`.
    pub fn number(n: f64) -> Self {
        if n.is_finite() {
            Value::Number(n)
        } else {
            Value::Missing
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn is_present(&self) -> bool {
        !self.is_missing()
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Value::Time(t) => Some(*t),
            Value::DateTime(dt) => Some(dt.time()),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Missing => "missing",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Infer a typed value from raw cell text.
    ///
    /// Empty (or whitespace-only) text is `Missing`. Then, in order: finite
    /// number, `YYYY-MM-DD` date, timestamp, time of day, and finally text.
    pub fn infer(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return Value::Missing;
        }
        if let Ok(n) = s.parse::<f64>() {
            if n.is_finite() && s.chars().any(|c| c.is_ascii_digit()) {
                return Value::Number(n);
            }
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
            return Value::Date(d);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Value::DateTime(dt.naive_utc());
        }
        for fmt in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Value::DateTime(dt);
            }
        }
        for fmt in TIME_FORMATS {
            if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
                return Value::Time(t);
            }
        }
        Value::Text(s.to_string())
    }

    /// Convert a JSON value. Strings go through [`Value::infer`].
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Missing,
            serde_json::Value::Number(n) => n.as_f64().map(Value::number).unwrap_or_default(),
            serde_json::Value::String(s) => Value::infer(s),
            serde_json::Value::Bool(b) => Value::Text(b.to_string()),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Missing => serde_json::Value::Null,
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            other => serde_json::Value::String(other.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Number(_) => 0,
            Value::Date(_) => 1,
            Value::DateTime(_) => 2,
            Value::Time(_) => 3,
            Value::Text(_) => 4,
            Value::Missing => 5,
        }
    }

    /// Bits of a number with `-0.0` folded into `0.0`.
    /// `-0.0` folded onto `0.0` so equality, hashing and ordering agree.
    fn unsigned_zero(n: f64) -> f64 {
        if n == 0.0 {
            0.0
        } else {
            n
        }
    }

    fn number_bits(n: f64) -> u64 {
        Self::unsigned_zero(n).to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Missing, Value::Missing) => true,
            (Value::Number(a), Value::Number(b)) => Self::number_bits(*a) == Self::number_bits(*b),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Missing => {}
            Value::Number(n) => Self::number_bits(*n).hash(state),
            Value::Text(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Time(t) => t.hash(state),
            Value::DateTime(dt) => dt.hash(state),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Self::unsigned_zero(*a).total_cmp(&Self::unsigned_zero(*b)),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Missing => serializer.serialize_none(),
            Value::Number(n) => serializer.serialize_f64(*n),
            other => serializer.collect_str(other),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Value::Time(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

/// Seconds since midnight, including the fractional part.
pub fn seconds_from_midnight(t: NaiveTime) -> f64 {
    t.num_seconds_from_midnight() as f64 + t.nanosecond() as f64 / 1e9
}

/// Time of day for a number of seconds since midnight, rounded to whole seconds.
pub fn time_from_seconds(secs: f64) -> Option<NaiveTime> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = (secs.round() as u32).min(86_399);
    NaiveTime::from_num_seconds_from_midnight_opt(whole, 0)
}

/// Render a key tuple for diagnostics, e.g. `(1, 2025-01-01, <missing>)`.
pub fn format_key(values: &[Value]) -> String {
    let parts: Vec<String> = values
        .iter()
        .map(|v| match v {
            Value::Missing => "<missing>".to_string(),
            other => other.to_string(),
        })
        .collect();
    format!("({})", parts.join(", "))
}

// =============================================================================
// Table
// =============================================================================

/// An ordered set of columns and rows aligned with them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Create a table from columns and positional rows.
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Build a table from JSON objects (one per row).
    ///
    /// Columns appear in first-seen order; a field absent from a record is
    /// `Missing` in that row.
    pub fn from_records(records: &[serde_json::Value]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            if let Some(obj) = record.as_object() {
                for key in obj.keys() {
                    if !columns.iter().any(|c| c == key) {
                        columns.push(key.clone());
                    }
                }
            }
        }

        let mut table = Self::new(columns);
        for record in records {
            let row = table
                .columns
                .iter()
                .map(|c| record.get(c).map(Value::from_json).unwrap_or_default())
                .collect();
            table.rows.push(row);
        }
        table
    }

    /// Rows as JSON objects. Missing values become `null`.
    pub fn to_records(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.clone(), v.to_json()))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Vec<Value>] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Value at `row` for column `name`, `Missing` if either is absent.
    pub fn value(&self, row: usize, name: &str) -> &Value {
        self.column_index(name)
            .and_then(|i| self.rows.get(row).and_then(|r| r.get(i)))
            .unwrap_or(&MISSING)
    }

    /// Iterate over the values of one column.
    pub fn column_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Value> + 'a {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .map(move |row| idx.and_then(|i| row.get(i)).unwrap_or(&MISSING))
    }

    /// Append a positional row, padding with `Missing` or truncating to fit.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Missing);
        self.rows.push(row);
    }

    /// Append a row given as `(column, value)` pairs. Unknown columns are ignored.
    pub fn push_named<I, S>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let mut row = vec![Value::Missing; self.columns.len()];
        for (name, value) in pairs {
            if let Some(i) = self.column_index(name.as_ref()) {
                row[i] = value;
            }
        }
        self.rows.push(row);
    }

    /// Append a column filled with `fill`. No-op if the column exists.
    pub fn add_column(&mut self, name: impl Into<String>, fill: Value) {
        let name = name.into();
        if self.has_column(&name) {
            return;
        }
        self.columns.push(name);
        for row in &mut self.rows {
            row.push(fill.clone());
        }
    }

    /// Rename a column in place. Returns `false` if `from` does not exist.
    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) -> bool {
        match self.column_index(from) {
            Some(i) => {
                self.columns[i] = to.into();
                true
            }
            None => false,
        }
    }

    /// Drop a column and its cells. Returns `false` if it does not exist.
    pub fn remove_column(&mut self, name: &str) -> bool {
        let Some(i) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(i);
        for row in &mut self.rows {
            row.remove(i);
        }
        true
    }

    /// Replace all column names at once. Lengths must match.
    pub(crate) fn set_columns(&mut self, columns: Vec<String>) {
        debug_assert_eq!(columns.len(), self.columns.len());
        self.columns = columns;
    }

    /// Project onto `columns`, in that order. Absent columns come out `Missing`.
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> Table {
        let indices: Vec<Option<usize>> = columns
            .iter()
            .map(|c| self.column_index(c.as_ref()))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|i| i.map(|i| row[i].clone()).unwrap_or_default())
                    .collect()
            })
            .collect();
        Table {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows,
        }
    }

    /// Columns of `self` also present in `other`, in `self`'s order.
    pub fn common_columns(&self, other: &Table) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| other.has_column(c))
            .cloned()
            .collect()
    }

    /// Key tuple of `row` over the given column indices.
    pub fn key_of(&self, row: usize, indices: &[usize]) -> Vec<Value> {
        indices.iter().map(|&i| self.rows[row][i].clone()).collect()
    }

    /// Stable sort of the rows by the given columns.
    pub fn sort_by_columns<S: AsRef<str>>(&mut self, columns: &[S]) {
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.column_index(c.as_ref()))
            .collect();
        self.rows.sort_by(|a, b| {
            indices
                .iter()
                .map(|&i| a[i].cmp(&b[i]))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }
}
