//! High-level reconciliation flows.
//!
//! Two entry points combine the leaf stages:
//!
//! - [`reconcile_table`]: an input sheet already laid out in (or mapped to)
//!   template column names is merged into one template table.
//! - [`import_observations`]: raw timestamped observations are merged,
//!   variable by variable, into whichever workbook sheet declares each
//!   variable.
//!
//! Field-local problems (a column that cannot be converted, a variable no
//! sheet declares) skip that field or variable with a warning diagnostic.
//! Anything else aborts the affected table and leaves it untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! use icasa::{reconcile_table, ReconcileConfig};
//!
//! let report = reconcile_table(&input, &template, &ReconcileConfig::default())?;
//! println!("{}", report.summary());
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ReconcileConfig;
use crate::error::{EngineError, EngineResult};
use crate::logs::Diagnostics;
use crate::models::{format_key, Table, VariableMetadata};
use crate::schema::TemplateWorkbook;

use super::aggregate::{aggregate, output_name, split_timestamp, AggregateSpec, Statistic};
use super::convert::convert_field;
use super::keys::resolve_key;
use super::mapper::{map_fields, map_identity};
use super::reconcile::{reconcile_detailed, ReconcileStats};

// =============================================================================
// Input-sheet reconciliation
// =============================================================================

/// Result of merging one input table into a template table
#[derive(Debug, Clone)]
pub struct TableReport {
    /// Merged table with the template's columns
    pub table: Table,
    /// Key the rows were aligned on
    pub key: Vec<String>,
    pub stats: ReconcileStats,
    /// Fields left out because they could not be converted or aggregated
    pub dropped_fields: Vec<String>,
    pub diagnostics: Diagnostics,
}

impl TableReport {
    pub fn summary(&self) -> String {
        format!(
            "Key {:?}: {} matched, {} inserted, {} filled, {} overwritten, {} fields dropped",
            self.key,
            self.stats.matched,
            self.stats.inserted,
            self.stats.filled,
            self.stats.overwritten,
            self.dropped_fields.len()
        )
    }
}

/// Merge `new` into `template` under `config`.
///
/// 1. Local column names and entity ids are mapped to canonical ones
/// 2. Only columns the template declares are kept
/// 3. Unit factors are applied
/// 4. With `summarize`, replicates are collapsed per group (mean and
///    standard deviation by default); derived columns survive only if the
///    template declares them
/// 5. The key is resolved from the remaining columns and the tables merged
pub fn reconcile_table(new: &Table, template: &Table, config: &ReconcileConfig) -> EngineResult<TableReport> {
    let mut diagnostics = Diagnostics::new();
    let mut dropped_fields = Vec::new();

    let mapped = map_fields(new.clone(), &config.field_map)?;
    let mapped = map_identity(mapped, config.effective_id_field(), &config.id_map)?;

    let common = mapped.common_columns(template);
    let mut data = mapped.select(&common);
    diagnostics.info(format!(
        "{} rows, {} of {} columns declared by the template",
        data.len(),
        common.len(),
        mapped.columns().len()
    ));

    for (field, factor) in &config.unit_factors {
        if let Err(e) = convert_field(&mut data, field, *factor) {
            drop_field(&mut data, field, e, &mut diagnostics, &mut dropped_fields)?;
        }
    }

    if config.summarize {
        data = summarize(data, template, config, &mut diagnostics, &mut dropped_fields)?;
    }

    let key = resolve_key(data.columns(), &config.key_candidates())?;
    let merged = reconcile_detailed(template, &data, &key, config.overwrite)?;
    diagnostics.success(format!(
        "Merged on {:?}: {} rows added, {} cells filled, {} overwritten",
        key, merged.stats.inserted, merged.stats.filled, merged.stats.overwritten
    ));

    Ok(TableReport {
        table: merged.table,
        key,
        stats: merged.stats,
        dropped_fields,
        diagnostics,
    })
}

/// Collapse replicates of the input table.
fn summarize(
    mut data: Table,
    template: &Table,
    config: &ReconcileConfig,
    diagnostics: &mut Diagnostics,
    dropped_fields: &mut Vec<String>,
) -> EngineResult<Table> {
    let group_fields = config.effective_group_fields(data.columns());
    let time_field = config
        .time_field
        .clone()
        .or_else(|| config.key_fields.time.clone())
        .filter(|t| data.has_column(t));

    if let Some(time) = &time_field {
        if data.column_values(time).any(|v| v.is_present() && v.as_time().is_none()) {
            let e = EngineError::invalid_field(time, "not a time of day, cannot be averaged");
            drop_field(&mut data, time, e, diagnostics, dropped_fields)?;
        }
    }
    let time_field = time_field.filter(|t| data.has_column(t));

    let key_fields = config.key_fields.all();
    let candidates: Vec<String> = if config.value_fields.is_empty() {
        data.columns()
            .iter()
            .filter(|c| !group_fields.contains(*c) && !key_fields.contains(&c.as_str()))
            .filter(|c| time_field.as_ref() != Some(*c))
            .cloned()
            .collect()
    } else {
        config
            .value_fields
            .iter()
            .filter(|f| data.has_column(f))
            .cloned()
            .collect()
    };

    let mut value_fields = Vec::with_capacity(candidates.len());
    for field in candidates {
        let bad = data
            .column_values(&field)
            .find(|v| v.is_present() && v.as_f64().is_none())
            .cloned();
        if let Some(bad) = bad {
            let e = EngineError::invalid_field(
                &field,
                format!("{} value '{}' cannot be summarized", bad.type_name(), bad),
            );
            drop_field(&mut data, &field, e, diagnostics, dropped_fields)?;
        } else {
            value_fields.push(field);
        }
    }

    let mut spec = config.aggregate_spec(value_fields, data.columns());
    spec.time_field = time_field;
    // A value field whose statistic cannot be computed is dropped like an
    // unconvertible one; the shrinking field list bounds the retries.
    let summarized = loop {
        let error = match aggregate(&data, &spec) {
            Ok(table) => break table,
            Err(e) => e,
        };
        let field = match &error {
            EngineError::InvalidField { field, .. } if spec.value_fields.contains(field) => field.clone(),
            _ => return Err(error),
        };
        spec.value_fields.retain(|f| *f != field);
        drop_field(&mut data, &field, error, diagnostics, dropped_fields)?;
    };
    diagnostics.info(format!(
        "Summarized {} rows into {} groups over {:?}",
        data.len(),
        summarized.len(),
        spec.group_fields
    ));

    // Keep derived columns only where the template has room for them
    let keep = summarized.common_columns(template);
    Ok(summarized.select(&keep))
}

/// Drop a field after a field-local error; propagate anything else.
fn drop_field(
    data: &mut Table,
    field: &str,
    error: EngineError,
    diagnostics: &mut Diagnostics,
    dropped_fields: &mut Vec<String>,
) -> EngineResult<()> {
    if !error.is_field_local() {
        return Err(error);
    }
    diagnostics.warning_indent(format!("{}. Skipped {}", error, field), 1);
    data.remove_column(field);
    dropped_fields.push(field.to_string());
    Ok(())
}

// =============================================================================
// Observation import
// =============================================================================

/// Column names of a raw observation export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationColumns {
    /// Timestamp of the measurement; split into date and time of day
    pub time: String,
    pub value: String,
    pub site: String,
    pub level: String,
    /// Filled from `time`, or read directly when there is no timestamp
    pub date: String,
}

impl Default for ObservationColumns {
    fn default() -> Self {
        Self {
            time: "time".to_string(),
            value: "value".to_string(),
            site: "site".to_string(),
            level: "level".to_string(),
            date: "date".to_string(),
        }
    }
}

/// What happened to one variable of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum VariableOutcome {
    /// Merged into `sheet`
    Merged { sheet: String, stats: ReconcileStats },
    /// Left out after a field-local problem
    Skipped { reason: String },
    /// The owning sheet could not be reconciled and was left untouched
    Failed { error: EngineError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableReport {
    pub variable: String,
    pub outcome: VariableOutcome,
}

/// Result of an observation import
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub variables: Vec<VariableReport>,
    pub diagnostics: Diagnostics,
}

impl BatchReport {
    pub fn merged_count(&self) -> usize {
        self.count(|o| matches!(o, VariableOutcome::Merged { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, VariableOutcome::Skipped { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, VariableOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&VariableOutcome) -> bool) -> usize {
        self.variables.iter().filter(|v| pred(&v.outcome)).count()
    }

    /// Sheets that received data, in first-touched order.
    pub fn touched_sheets(&self) -> Vec<&str> {
        let mut sheets: Vec<&str> = Vec::new();
        for v in &self.variables {
            if let VariableOutcome::Merged { sheet, .. } = &v.outcome {
                if !sheets.contains(&sheet.as_str()) {
                    sheets.push(sheet);
                }
            }
        }
        sheets
    }

    pub fn summary(&self) -> String {
        format!(
            "Imported: {} variables merged, {} skipped, {} failed",
            self.merged_count(),
            self.skipped_count(),
            self.failed_count()
        )
    }
}

/// Merge raw observations into the workbook, one variable at a time.
///
/// For every variable: convert the raw value, aggregate it daily per site
/// and level when the variable names an aggregation, rename the raw columns
/// to the template's key columns and the variable name, locate the sheet
/// declaring the variable and reconcile into it. Merged sheets are replaced
/// in `workbook`; writing them out is up to the caller.
///
/// An export lacking its site, value or date column (or holding an
/// unreadable timestamp) fails every variable and leaves `workbook` as is.
pub fn import_observations(
    raw: &Table,
    variables: &[VariableMetadata],
    columns: &ObservationColumns,
    workbook: &mut TemplateWorkbook,
    config: &ReconcileConfig,
) -> BatchReport {
    let mut report = BatchReport::default();
    let headers = workbook.headers();

    // Export layout errors fail every variable of the batch
    let shared = if raw.is_empty() {
        None
    } else {
        let prepared = prepare_export(raw, columns, config);
        if let Err(e) = &prepared {
            report.diagnostics.error(format!("Observation export rejected: {}", e));
        }
        Some(prepared)
    };

    for variable in variables {
        report.diagnostics.info(format!("Importing {}", variable.name));
        let result = match &shared {
            None => Ok(empty_export(variable)),
            Some(Err(e)) => Err(e.clone()),
            Some(Ok(export)) => import_variable(export, variable, columns, &headers, workbook, config, &mut report.diagnostics),
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_field_local() && !matches!(shared, Some(Err(_))) => {
                VariableOutcome::Skipped { reason: e.to_string() }
            }
            Err(e) => VariableOutcome::Failed { error: e },
        };

        match &outcome {
            VariableOutcome::Merged { sheet, stats } => report.diagnostics.success(format!(
                "{} merged into '{}' ({} rows added, {} cells filled, {} overwritten)",
                variable.name, sheet, stats.inserted, stats.filled, stats.overwritten
            )),
            VariableOutcome::Skipped { reason } => report
                .diagnostics
                .warning_indent(format!("{}. Skipped {}", reason, variable.name), 1),
            VariableOutcome::Failed { error } => report
                .diagnostics
                .error(format!("{} not merged, sheet left untouched: {}", variable.name, error)),
        }

        report.variables.push(VariableReport {
            variable: variable.name.clone(),
            outcome,
        });
    }

    let summary = report.summary();
    report.diagnostics.info(summary);
    report
}

fn empty_export(variable: &VariableMetadata) -> VariableOutcome {
    VariableOutcome::Skipped {
        reason: format!(
            "No observations available for {}; check that datasets exist for the requested sites and time span",
            variable.name
        ),
    }
}

fn import_variable(
    export: &Table,
    variable: &VariableMetadata,
    columns: &ObservationColumns,
    headers: &[(String, Vec<String>)],
    workbook: &mut TemplateWorkbook,
    config: &ReconcileConfig,
    diagnostics: &mut Diagnostics,
) -> EngineResult<VariableOutcome> {
    let data = prepare_observations(export, variable, columns, config)?;

    let sheet_name = variable.owning_table(headers)?.to_string();
    let Some(sheet) = workbook.sheet(&sheet_name) else {
        return Err(EngineError::FieldNotFound(variable.name.clone()));
    };
    let date_col = config.key_fields.date.as_deref().unwrap_or(&columns.date);
    if !sheet.table.has_column(date_col) {
        return Ok(VariableOutcome::Skipped {
            reason: format!("There is no {} in the same sheet as {}", date_col, variable.name),
        });
    }

    let available = data.common_columns(&sheet.table);
    let key = resolve_key(&available, &config.key_candidates())?;
    diagnostics.info_indent(format!("Sheet '{}', key {:?}", sheet_name, key), 1);

    let merged = reconcile_detailed(&sheet.table, &data, &key, config.overwrite)?;
    let stats = merged.stats;
    workbook
        .replace_table(&sheet_name, merged.table)
        .map_err(|_| EngineError::FieldNotFound(variable.name.clone()))?;

    Ok(VariableOutcome::Merged {
        sheet: sheet_name,
        stats,
    })
}

/// Checks and normalises the layout every variable of an export shares:
/// site and value columns present, timestamp split into date and time,
/// a level column, canonical site ids.
fn prepare_export(raw: &Table, columns: &ObservationColumns, config: &ReconcileConfig) -> EngineResult<Table> {
    for required in [&columns.site, &columns.value] {
        if !raw.has_column(required) {
            return Err(EngineError::missing_column(required.as_str(), "observation"));
        }
    }
    let mut data = raw.clone();
    if data.has_column(&columns.time) {
        data = split_timestamp(data, &columns.time, &columns.date)?;
    }
    if !data.has_column(&columns.date) {
        return Err(EngineError::missing_column(columns.date.as_str(), "observation"));
    }
    data.add_column(columns.level.as_str(), Default::default());
    map_identity(data, &columns.site, &config.id_map)
}

/// Prepared export → one table in template column names for `variable`.
fn prepare_observations(
    export: &Table,
    variable: &VariableMetadata,
    columns: &ObservationColumns,
    config: &ReconcileConfig,
) -> EngineResult<Table> {
    let mut data = export.clone();

    if let Some(factor) = variable.conversion {
        convert_field(&mut data, &columns.value, factor)?;
    }

    if let Some(function) = variable.aggregation {
        let spec = AggregateSpec::new(
            [columns.date.as_str(), columns.site.as_str(), columns.level.as_str()],
            [columns.value.as_str()],
            function,
        )
        .with_time(columns.time.as_str())
        .with_count(config.with_count)
        .with_stdev(config.with_stdev);
        data = aggregate(&data, &spec)?;
        log::debug!(
            "{}: {} raw rows aggregated to {} daily rows ({})",
            variable.name,
            export.len(),
            data.len(),
            function
        );
    }

    let keys = &config.key_fields;
    data.rename_column(&columns.site, keys.entity_id.as_str());
    data.rename_column(&columns.date, keys.date.clone().unwrap_or_else(|| columns.date.clone()));
    match &keys.time {
        Some(time) => {
            data.rename_column(&columns.time, time.as_str());
        }
        None => {
            data.remove_column(&columns.time);
        }
    }
    match &keys.level {
        Some(level) => {
            data.rename_column(&columns.level, level.as_str());
        }
        None => {
            data.remove_column(&columns.level);
        }
    }
    data.rename_column(
        &output_name(&columns.value, Statistic::StandardDeviation),
        output_name(&variable.name, Statistic::StandardDeviation),
    );
    data.rename_column(&columns.value, variable.name.as_str());

    if let Some(dup) = first_duplicate(data.columns()) {
        return Err(EngineError::invalid_field(dup, "raw column clashes with a template key column"));
    }
    Ok(data)
}

fn first_duplicate(columns: &[String]) -> Option<&str> {
    columns
        .iter()
        .enumerate()
        .find(|(i, c)| columns[..*i].contains(c))
        .map(|(_, c)| c.as_str())
}

/// Rows of `table` whose key tuple appears more than once, for diagnostics.
pub fn duplicate_keys(table: &Table, key: &[String]) -> Vec<String> {
    let indices: Vec<usize> = key.iter().filter_map(|k| table.column_index(k)).collect();
    let mut seen = std::collections::HashSet::new();
    let mut dups = Vec::new();
    for row in 0..table.len() {
        let k = table.key_of(row, &indices);
        if !seen.insert(k.clone()) {
            let rendered = format_key(&k);
            if !dups.contains(&rendered) {
                dups.push(rendered);
            }
        }
    }
    dups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregationFunction, Value};
    use crate::schema::TemplateSheet;
    use crate::transform::keys::KeyFields;
    use crate::transform::NameMap;
    use chrono::NaiveDate;

    fn date(s: &str) -> Value {
        Value::Date(NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap())
    }

    fn plant_template() -> Table {
        Table::from_rows(
            ["TRTNO", "DATE", "PHTD", "PHTD_stdev", "NOTE"],
            vec![vec![1.into(), date("2025-06-01"), 1.1.into(), Value::Missing, "keep".into()]],
        )
    }

    #[test]
    fn test_reconcile_table_summarizes_replicates() {
        let input = Table::from_rows(
            ["plot", "day", "RP", "height_cm", "comment"],
            vec![
                vec![2.into(), date("2025-06-01"), 1.into(), 100.0.into(), "x".into()],
                vec![2.into(), date("2025-06-01"), 2.into(), 140.0.into(), "y".into()],
                vec![1.into(), date("2025-06-01"), 1.into(), 150.0.into(), Value::Missing],
            ],
        );
        let config = ReconcileConfig {
            summarize: true,
            unit_factors: [("PHTD".to_string(), 100.0)].into_iter().collect(),
            field_map: NameMap::from_pairs([("plot", "TRTNO"), ("day", "DATE"), ("height_cm", "PHTD")]),
            ..ReconcileConfig::default()
        };

        let report = reconcile_table(&input, &plant_template(), &config).unwrap();
        let t = &report.table;

        assert_eq!(report.key, vec!["TRTNO", "DATE"]);
        assert_eq!(t.columns(), plant_template().columns());
        assert_eq!(t.len(), 2);
        // Stored value preserved
        assert_eq!(t.value(0, "PHTD"), &Value::Number(1.1));
        assert_eq!(t.value(0, "NOTE"), &Value::text("keep"));
        // Single sample: stdev stays missing
        assert_eq!(t.value(0, "PHTD_stdev"), &Value::Missing);
        // New treatment averaged and converted
        assert_eq!(t.value(1, "TRTNO"), &Value::Number(2.0));
        assert!((t.value(1, "PHTD").as_f64().unwrap() - 1.2).abs() < 1e-9);
        assert!(t.value(1, "PHTD_stdev").as_f64().is_some());
    }

    #[test]
    fn test_reconcile_table_keeps_levels_apart() {
        let template = Table::new(["TRTNO", "DATE", "SLLB", "SWCD"]);
        let input = Table::from_rows(
            ["TRTNO", "DATE", "SLLB", "SWCD"],
            vec![
                vec![1.into(), date("2025-06-01"), Value::Missing, 10.0.into()],
                vec![1.into(), date("2025-06-01"), 5.into(), 30.0.into()],
            ],
        );
        let mut config = ReconcileConfig {
            summarize: true,
            ..ReconcileConfig::default()
        };
        config.key_fields.level = Some("SLLB".to_string());

        let report = reconcile_table(&input, &template, &config).unwrap();
        assert_eq!(report.key, vec!["TRTNO", "DATE", "SLLB"]);
        assert_eq!(report.table.len(), 2);
        assert_eq!(report.table.value(0, "SLLB"), &Value::Number(5.0));
        assert_eq!(report.table.value(0, "SWCD"), &Value::Number(30.0));
        assert_eq!(report.table.value(1, "SLLB"), &Value::Missing);
        assert_eq!(report.table.value(1, "SWCD"), &Value::Number(10.0));
    }

    #[test]
    fn test_reconcile_table_drops_field_whose_sum_overflows() {
        let template = Table::new(["TRTNO", "DATE", "PHTD", "LAID"]);
        let input = Table::from_rows(
            ["TRTNO", "DATE", "PHTD", "LAID"],
            vec![
                vec![1.into(), date("2025-06-01"), 1e308.into(), 1.0.into()],
                vec![1.into(), date("2025-06-01"), 1e308.into(), 2.0.into()],
            ],
        );
        let config = ReconcileConfig {
            summarize: true,
            aggregation_function: AggregationFunction::Sum,
            ..ReconcileConfig::default()
        };

        let report = reconcile_table(&input, &template, &config).unwrap();
        assert_eq!(report.dropped_fields, vec!["PHTD"]);
        assert_eq!(report.table.value(0, "PHTD"), &Value::Missing);
        assert_eq!(report.table.value(0, "LAID"), &Value::Number(3.0));
    }

    #[test]
    fn test_reconcile_table_drops_unconvertible_field() {
        let template = Table::from_rows(
            ["TRTNO", "DATE", "PHTD", "NOTE"],
            vec![vec![1.into(), date("2025-06-01"), Value::Missing, Value::Missing]],
        );
        let input = Table::from_rows(
            ["TRTNO", "DATE", "PHTD", "NOTE"],
            vec![vec![1.into(), date("2025-06-01"), 50.0.into(), "lodged".into()]],
        );
        let config = ReconcileConfig {
            unit_factors: [("NOTE".to_string(), 2.0)].into_iter().collect(),
            ..ReconcileConfig::default()
        };

        let report = reconcile_table(&input, &template, &config).unwrap();
        assert_eq!(report.dropped_fields, vec!["NOTE"]);
        assert!(report.diagnostics.has_warnings());
        assert_eq!(report.table.value(0, "PHTD"), &Value::Number(50.0));
        assert_eq!(report.table.value(0, "NOTE"), &Value::Missing);
    }

    #[test]
    fn test_reconcile_table_collision_aborts() {
        let input = Table::from_rows(
            ["TRTNO", "DATE", "PHTD"],
            vec![
                vec![1.into(), date("2025-06-01"), 1.0.into()],
                vec![1.into(), date("2025-06-01"), 2.0.into()],
            ],
        );
        let err = reconcile_table(&input, &plant_template(), &ReconcileConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::KeyCollision { .. }));
        assert_eq!(duplicate_keys(&input, &["TRTNO".to_string(), "DATE".to_string()]), vec!["(1, 2025-06-01)"]);
    }

    fn observation_config() -> ReconcileConfig {
        ReconcileConfig {
            key_fields: KeyFields::observation_defaults(),
            with_stdev: false,
            ..ReconcileConfig::default()
        }
    }

    fn observation_workbook() -> TemplateWorkbook {
        TemplateWorkbook::new(vec![
            TemplateSheet::new(
                "Soil_water",
                Table::from_rows(
                    ["sampling_location_number", "date_of_measurement", "time_of_measurement", "SWCD"],
                    vec![vec![1.into(), date("2025-06-01"), Value::Missing, 0.3.into()]],
                ),
            ),
            TemplateSheet::new("Notes", Table::new(["LAID"])),
        ])
    }

    fn raw() -> Table {
        Table::from_rows(
            ["time", "value", "site", "level"],
            vec![
                vec![Value::infer("2025-06-01 08:00:00"), 20.0.into(), 1.into(), Value::Missing],
                vec![Value::infer("2025-06-01 10:00:00"), 40.0.into(), 1.into(), Value::Missing],
                vec![Value::infer("2025-06-02 09:00:00"), 50.0.into(), 1.into(), Value::Missing],
            ],
        )
    }

    #[test]
    fn test_import_observations_daily_mean() {
        let mut wb = observation_workbook();
        let vars = vec![
            VariableMetadata::new("SWCD")
                .with_conversion(100.0)
                .with_aggregation(AggregationFunction::Mean),
            VariableMetadata::new("XXXX"),
            VariableMetadata::new("LAID").with_aggregation(AggregationFunction::Mean),
        ];
        let report = import_observations(&raw(), &vars, &ObservationColumns::default(), &mut wb, &observation_config());

        assert_eq!(report.merged_count(), 1);
        assert_eq!(report.skipped_count(), 2);
        assert_eq!(report.touched_sheets(), vec!["Soil_water"]);

        let sheet = &wb.sheet("Soil_water").unwrap().table;
        assert_eq!(sheet.len(), 2);
        // Stored value preserved, new day appended
        assert_eq!(sheet.value(0, "SWCD"), &Value::Number(0.3));
        assert_eq!(sheet.value(1, "date_of_measurement"), &date("2025-06-02"));
        assert_eq!(sheet.value(1, "SWCD"), &Value::Number(0.5));
        assert_eq!(sheet.value(1, "time_of_measurement"), &Value::infer("09:00:00"));

        // Locator miss and missing date column are both explicit skips
        let warnings: Vec<_> = report
            .diagnostics
            .at_level(crate::logs::LogLevel::Warning)
            .map(|e| e.message.clone())
            .collect();
        assert!(warnings.iter().any(|w| w.contains("XXXX")));
        assert!(warnings.iter().any(|w| w.contains("date_of_measurement") && w.contains("LAID")));
    }

    #[test]
    fn test_import_empty_observations_skipped() {
        let mut wb = observation_workbook();
        let before = wb.clone();
        let report = import_observations(
            &Table::new(["time", "value", "site"]),
            &[VariableMetadata::new("SWCD")],
            &ObservationColumns::default(),
            &mut wb,
            &observation_config(),
        );
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(wb, before);
    }

    #[test]
    fn test_import_export_without_site_fails_batch() {
        let mut wb = observation_workbook();
        let before = wb.clone();
        let mut export = raw();
        export.remove_column("site");
        let vars = vec![
            VariableMetadata::new("SWCD").with_aggregation(AggregationFunction::Mean),
            VariableMetadata::new("XXXX"),
        ];

        let report = import_observations(&export, &vars, &ObservationColumns::default(), &mut wb, &observation_config());
        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.skipped_count(), 0);
        assert!(matches!(
            &report.variables[0].outcome,
            VariableOutcome::Failed { error: EngineError::MissingColumn { field, .. } } if field == "site"
        ));
        assert_eq!(wb, before);
    }

    #[test]
    fn test_import_unreadable_timestamp_fails_batch() {
        let mut wb = observation_workbook();
        let before = wb.clone();
        let export = Table::from_rows(
            ["time", "value", "site"],
            vec![vec!["yesterday".into(), 1.0.into(), 1.into()]],
        );
        let report = import_observations(
            &export,
            &[VariableMetadata::new("SWCD").with_aggregation(AggregationFunction::Mean)],
            &ObservationColumns::default(),
            &mut wb,
            &observation_config(),
        );
        assert_eq!(report.failed_count(), 1);
        assert_eq!(wb, before);
    }

    #[test]
    fn test_import_without_aggregation_collides() {
        let mut wb = observation_workbook();
        let before = wb.clone();
        let report = import_observations(
            &raw(),
            &[VariableMetadata::new("SWCD")],
            &ObservationColumns::default(),
            &mut wb,
            &observation_config(),
        );
        assert_eq!(report.failed_count(), 1);
        assert_eq!(wb, before);
    }
}
