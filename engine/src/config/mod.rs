//! Reconciliation configuration.
//!
//! One explicit [`ReconcileConfig`] value is passed into every pipeline
//! call; nothing is read from process-wide state.
//!
//! # Example
//!
//! ```json
//! {
//!   "overwrite": false,
//!   "key_fields": { "entity_id": "TRTNO", "date": "DATE", "level": "SLLB" },
//!   "key_strategy": "level",
//!   "summarize": true,
//!   "value_fields": ["PHTD"],
//!   "aggregation_function": "mean",
//!   "unit_factors": { "PHTD": 100 },
//!   "field_map": [["height_cm", "PHTD"], ["plot", "TRTNO"]]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::models::AggregationFunction;
use crate::transform::{AggregateSpec, KeyFields, KeyStrategy, NameMap, UnitFactors};
use crate::validation::validate_reconcile_config;

/// Environment variable naming a default configuration file.
pub const CONFIG_ENV_VAR: &str = "ICASA_CONFIG";

fn default_version() -> String {
    "1.0".to_string()
}

fn default_function() -> AggregationFunction {
    AggregationFunction::Mean
}

fn default_true() -> bool {
    true
}

/// Everything a reconciliation needs to know besides the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Version of the configuration format
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// New values win over stored ones when both are present
    #[serde(default)]
    pub overwrite: bool,

    /// Template names of the identity columns
    #[serde(default)]
    pub key_fields: KeyFields,

    /// Whether level or time follows the date in the merge key
    #[serde(default)]
    pub key_strategy: KeyStrategy,

    /// Collapse replicates before merging input sheets
    #[serde(default)]
    pub summarize: bool,

    /// Grouping fields; empty means entity id, date and, when the data has
    /// it, the level column
    #[serde(default)]
    pub group_fields: Vec<String>,

    /// Time-of-day field kept through aggregation
    #[serde(default)]
    pub time_field: Option<String>,

    /// Fields to aggregate; empty means every shared non-key field
    #[serde(default)]
    pub value_fields: Vec<String>,

    #[serde(default = "default_function")]
    pub aggregation_function: AggregationFunction,

    /// Overrides the mean for the time field
    #[serde(default)]
    pub time_aggregation: Option<AggregationFunction>,

    #[serde(default)]
    pub with_count: bool,

    #[serde(default = "default_true")]
    pub with_stdev: bool,

    /// Native units per canonical unit, by canonical field name
    #[serde(default)]
    pub unit_factors: UnitFactors,

    /// Local column name → canonical name
    #[serde(default)]
    pub field_map: NameMap,

    /// Column holding entity ids to translate; defaults to the entity id field
    #[serde(default)]
    pub id_field: Option<String>,

    /// Local entity id → canonical entity id
    #[serde(default)]
    pub id_map: NameMap,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            description: String::new(),
            overwrite: false,
            key_fields: KeyFields::default(),
            key_strategy: KeyStrategy::default(),
            summarize: false,
            group_fields: Vec::new(),
            time_field: None,
            value_fields: Vec::new(),
            aggregation_function: default_function(),
            time_aggregation: None,
            with_count: false,
            with_stdev: true,
            unit_factors: UnitFactors::new(),
            field_map: NameMap::new(),
            id_field: None,
            id_map: NameMap::new(),
        }
    }
}

impl ReconcileConfig {
    /// Parse and schema-check a configuration.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        validate_reconcile_config(&value).map_err(|errors| ConfigError::Schema { errors })?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Key candidates in priority order for the configured strategy.
    pub fn key_candidates(&self) -> Vec<String> {
        self.key_fields.candidates(self.key_strategy)
    }

    /// Grouping fields for a table with `columns`.
    ///
    /// Falls back to entity id plus date, and the level column whenever it is
    /// configured and present, so distinct levels never share a group.
    pub fn effective_group_fields(&self, columns: &[String]) -> Vec<String> {
        if !self.group_fields.is_empty() {
            return self.group_fields.clone();
        }
        let level = self.key_fields.level.as_ref().filter(|l| columns.contains(l));
        std::iter::once(&self.key_fields.entity_id)
            .chain(self.key_fields.date.as_ref())
            .chain(level)
            .cloned()
            .collect()
    }

    /// Column whose entity ids go through `id_map`.
    pub fn effective_id_field(&self) -> &str {
        self.id_field.as_deref().unwrap_or(&self.key_fields.entity_id)
    }

    /// Aggregation request for `value_fields` of a table with `columns`.
    pub fn aggregate_spec(&self, value_fields: Vec<String>, columns: &[String]) -> AggregateSpec {
        AggregateSpec {
            group_fields: self.effective_group_fields(columns),
            time_field: self.time_field.clone(),
            value_fields,
            function: self.aggregation_function,
            time_function: self.time_aggregation,
            with_count: self.with_count,
            with_stdev: self.with_stdev,
        }
    }
}

/// Configuration for summarising plant measurements per treatment and date.
pub fn example_config() -> ReconcileConfig {
    ReconcileConfig {
        description: "Plant height in cm, replicates averaged per treatment and date".to_string(),
        summarize: true,
        value_fields: vec!["PHTD".to_string()],
        unit_factors: [("PHTD".to_string(), 100.0)].into_iter().collect(),
        field_map: NameMap::from_pairs([("plot", "TRTNO"), ("day", "DATE"), ("height_cm", "PHTD")]),
        ..ReconcileConfig::default()
    }
}
