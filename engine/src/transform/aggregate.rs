//! Collapse repeated observations into one row per group.
//!
//! ```text
//! TRTNO  DATE        PHTD              TRTNO  DATE        PHTD  PHTD_stdev  number_of_samples
//! 1      2025-06-01  10          →     1      2025-06-01  15    7.07        2
//! 1      2025-06-01  20
//! ```
//!
//! Output names come from [`STATISTIC_OUTPUTS`]: the primary statistic keeps
//! the field name, the standard deviation gets [`STDEV_SUFFIX`], and sample
//! counts share the single [`SAMPLE_COUNT_COLUMN`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::models::{seconds_from_midnight, time_from_seconds, AggregationFunction, Table, Value};

/// Suffix of standard-deviation columns.
pub const STDEV_SUFFIX: &str = "_stdev";

/// Shared sample-count column.
pub const SAMPLE_COUNT_COLUMN: &str = "number_of_samples";

/// Statistics the aggregator can emit for a value field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    /// The requested mean/sum/min/max.
    Primary,
    StandardDeviation,
    Count,
}

/// How a statistic's output column is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputName {
    Field,
    Suffixed(&'static str),
    Fixed(&'static str),
}

/// Statistic → output column naming.
pub const STATISTIC_OUTPUTS: &[(Statistic, OutputName)] = &[
    (Statistic::Primary, OutputName::Field),
    (Statistic::StandardDeviation, OutputName::Suffixed(STDEV_SUFFIX)),
    (Statistic::Count, OutputName::Fixed(SAMPLE_COUNT_COLUMN)),
];

/// Output column name of `statistic` computed over `field`.
pub fn output_name(field: &str, statistic: Statistic) -> String {
    let naming = STATISTIC_OUTPUTS
        .iter()
        .find(|(s, _)| *s == statistic)
        .map(|(_, n)| *n)
        .unwrap_or(OutputName::Field);
    match naming {
        OutputName::Field => field.to_string(),
        OutputName::Suffixed(suffix) => format!("{}{}", field, suffix),
        OutputName::Fixed(name) => name.to_string(),
    }
}

/// One planned output column.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub field: String,
    pub statistic: Statistic,
}

/// What to aggregate and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    /// Exact-match grouping fields, e.g. entity id and date
    pub group_fields: Vec<String>,
    /// Time-of-day field kept per group (mean by default)
    #[serde(default)]
    pub time_field: Option<String>,
    pub value_fields: Vec<String>,
    pub function: AggregationFunction,
    /// Overrides the mean for the time field
    #[serde(default)]
    pub time_function: Option<AggregationFunction>,
    #[serde(default)]
    pub with_count: bool,
    #[serde(default)]
    pub with_stdev: bool,
}

impl AggregateSpec {
    pub fn new<G, V, S>(group_fields: G, value_fields: V, function: AggregationFunction) -> Self
    where
        G: IntoIterator<Item = S>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group_fields: group_fields.into_iter().map(Into::into).collect(),
            time_field: None,
            value_fields: value_fields.into_iter().map(Into::into).collect(),
            function,
            time_function: None,
            with_count: false,
            with_stdev: false,
        }
    }

    pub fn with_time(mut self, field: impl Into<String>) -> Self {
        self.time_field = Some(field.into());
        self
    }

    pub fn with_time_function(mut self, function: AggregationFunction) -> Self {
        self.time_function = Some(function);
        self
    }

    pub fn with_count(mut self, enabled: bool) -> Self {
        self.with_count = enabled;
        self
    }

    pub fn with_stdev(mut self, enabled: bool) -> Self {
        self.with_stdev = enabled;
        self
    }

    /// Value-field output columns in emission order.
    ///
    /// Every value field requests its own count, but they all share one
    /// column name; only the first request survives, so the shared
    /// `number_of_samples` counts the first value field's samples.
    pub fn output_plan(&self) -> Vec<OutputColumn> {
        let mut planned: Vec<OutputColumn> = Vec::new();
        for field in &self.value_fields {
            planned.push(self.column(field, Statistic::Primary));
            if self.with_stdev {
                planned.push(self.column(field, Statistic::StandardDeviation));
            }
        }
        if self.with_count {
            for field in &self.value_fields {
                planned.push(self.column(field, Statistic::Count));
            }
        }

        let mut kept: Vec<OutputColumn> = Vec::with_capacity(planned.len());
        for column in planned {
            if !kept.iter().any(|k| k.name == column.name) {
                kept.push(column);
            }
        }
        kept
    }

    fn column(&self, field: &str, statistic: Statistic) -> OutputColumn {
        OutputColumn {
            name: output_name(field, statistic),
            field: field.to_string(),
            statistic,
        }
    }
}

/// Aggregate `table` according to `spec`.
///
/// Rows are grouped on the exact tuple of `group_fields`; a missing value is
/// its own group and never merges with a real one. Output rows are ordered by
/// group key.
pub fn aggregate(table: &Table, spec: &AggregateSpec) -> EngineResult<Table> {
    if table.is_empty() {
        return Err(EngineError::EmptyInput);
    }

    let group_idx = indices_of(table, &spec.group_fields)?;
    let value_idx = indices_of(table, &spec.value_fields)?;
    let time_idx = spec.time_field.as_ref().and_then(|t| table.column_index(t));

    for (field, &idx) in spec.value_fields.iter().zip(&value_idx) {
        ensure_numeric(table, field, idx)?;
    }
    if let (Some(field), Some(idx)) = (&spec.time_field, time_idx) {
        if spec.time_function == Some(AggregationFunction::Sum) {
            return Err(EngineError::invalid_field(field, "sum is not defined for time of day"));
        }
        ensure_time(table, field, idx)?;
    }

    let mut order: Vec<Vec<Value>> = Vec::new();
    let mut groups: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
    for row in 0..table.len() {
        let key = table.key_of(row, &group_idx);
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }
    order.sort();

    let plan = spec.output_plan();
    let mut columns: Vec<String> = spec.group_fields.clone();
    if let (Some(field), Some(_)) = (&spec.time_field, time_idx) {
        columns.push(field.clone());
    }
    columns.extend(plan.iter().map(|c| c.name.clone()));

    let mut output = Table::new(columns);
    for key in order {
        let members = &groups[&key];
        let mut row = key;

        if let Some(idx) = time_idx {
            let function = spec.time_function.unwrap_or(AggregationFunction::Mean);
            let seconds: Vec<f64> = members
                .iter()
                .filter_map(|&r| table.rows()[r][idx].as_time())
                .map(seconds_from_midnight)
                .collect();
            row.push(
                function
                    .apply(&seconds)
                    .and_then(time_from_seconds)
                    .map(Value::Time)
                    .unwrap_or_default(),
            );
        }

        for column in &plan {
            let pos = spec
                .value_fields
                .iter()
                .position(|f| *f == column.field)
                .map(|p| value_idx[p]);
            let samples: Vec<f64> = pos
                .map(|idx| {
                    members
                        .iter()
                        .filter_map(|&r| table.rows()[r][idx].as_f64())
                        .collect()
                })
                .unwrap_or_default();

            let value = match column.statistic {
                Statistic::Primary => spec.function.apply(&samples),
                Statistic::StandardDeviation => sample_stdev(&samples),
                Statistic::Count => Some(samples.len() as f64),
            };
            match value {
                Some(v) if !v.is_finite() => {
                    return Err(EngineError::invalid_field(
                        &column.field,
                        format!("{} over {} samples is out of range", column.name, samples.len()),
                    ))
                }
                Some(v) => row.push(Value::Number(v)),
                None => row.push(Value::Missing),
            }
        }

        output.push_row(row);
    }

    log::debug!(
        "Aggregated {} rows into {} groups over {:?}",
        table.len(),
        output.len(),
        spec.group_fields
    );
    Ok(output)
}

/// Split a timestamp column into a date column and a time-of-day column.
///
/// `timestamp_field` keeps its name and becomes the time of day; the calendar
/// day goes to `date_field`, which then serves as the daily bucket for
/// [`aggregate`]. Cells that already hold a date or a time are split the same
/// way with the other half missing.
pub fn split_timestamp(mut table: Table, timestamp_field: &str, date_field: &str) -> EngineResult<Table> {
    let Some(ts_idx) = table.column_index(timestamp_field) else {
        return Err(EngineError::missing_column(timestamp_field, "observation"));
    };
    table.add_column(date_field, Value::Missing);
    let Some(date_idx) = table.column_index(date_field) else {
        return Err(EngineError::missing_column(date_field, "observation"));
    };

    for row in table.rows_mut() {
        let (date, time) = match &row[ts_idx] {
            Value::DateTime(dt) => split(dt),
            Value::Date(d) => (Value::Date(*d), Value::Missing),
            Value::Time(t) => (row[date_idx].clone(), Value::Time(*t)),
            Value::Missing => (row[date_idx].clone(), Value::Missing),
            other => {
                return Err(EngineError::invalid_field(
                    timestamp_field,
                    format!("{} value '{}' is not a timestamp", other.type_name(), other),
                ))
            }
        };
        row[date_idx] = date;
        row[ts_idx] = time;
    }
    Ok(table)
}

fn split(dt: &NaiveDateTime) -> (Value, Value) {
    (Value::Date(dt.date()), Value::Time(dt.time()))
}

/// Sample standard deviation (n − 1). `None` for fewer than two samples.
fn sample_stdev(samples: &[f64]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    // Welford's update
    let (mut mean, mut m2) = (0.0, 0.0);
    for (i, x) in samples.iter().enumerate() {
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }
    Some((m2 / (samples.len() - 1) as f64).sqrt())
}

fn indices_of(table: &Table, fields: &[String]) -> EngineResult<Vec<usize>> {
    fields
        .iter()
        .map(|f| {
            table
                .column_index(f)
                .ok_or_else(|| EngineError::missing_column(f, "input"))
        })
        .collect()
}

fn ensure_numeric(table: &Table, field: &str, idx: usize) -> EngineResult<()> {
    match table
        .rows()
        .iter()
        .map(|r| &r[idx])
        .find(|v| v.is_present() && v.as_f64().is_none())
    {
        Some(bad) => Err(EngineError::invalid_field(
            field,
            format!("cannot aggregate {} value '{}'", bad.type_name(), bad),
        )),
        None => Ok(()),
    }
}

fn ensure_time(table: &Table, field: &str, idx: usize) -> EngineResult<()> {
    match table
        .rows()
        .iter()
        .map(|r| &r[idx])
        .find(|v| v.is_present() && v.as_time().is_none())
    {
        Some(bad) => Err(EngineError::invalid_field(
            field,
            format!("{} value '{}' is not a time of day", bad.type_name(), bad),
        )),
        None => Ok(()),
    }
}
