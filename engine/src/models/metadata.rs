//! Per-variable metadata: unit conversion factor, aggregation function and
//! the template table that owns the variable.
//!
//! Observation databases describe how a value type maps onto ICASA variables
//! in a free-text comment, one variable per line:
//!
//! ```text
//! ICASA: PHTD*100, mean
//! ICASA: SWCD
//! ```
//!
//! The factor (after `*`) and the aggregation (after `,`) are optional.

use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};
use crate::schema::locate_table;

static ICASA_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)ICASA:[ \t]*(?P<name>[^*\n,]+)(?:\*(?P<conversion>\d+(?:\.\d+)?))?(?:,[ \t]*(?P<aggregation>\S+))?[ \t\r]*$",
    )
    .expect("ICASA comment pattern is valid")
});

/// Statistic used to collapse the samples of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationFunction {
    Mean,
    Sum,
    Min,
    Max,
}

impl AggregationFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    /// Apply to a non-empty slice of samples.
    pub fn apply(&self, samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let result = match self {
            // Running mean, so large samples do not overflow an intermediate sum
            Self::Mean => samples
                .iter()
                .enumerate()
                .fold(0.0, |mean, (i, x)| mean + (x - mean) / (i + 1) as f64),
            Self::Sum => samples.iter().sum(),
            Self::Min => samples.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(result)
    }
}

impl fmt::Display for AggregationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => Err(format!("unknown aggregation function '{}'", other)),
        }
    }
}

/// Metadata for one canonical variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableMetadata {
    /// Canonical ICASA variable name
    pub name: String,
    /// Native units per canonical unit; values are divided by it
    pub conversion: Option<f64>,
    /// Daily aggregation, if the raw data must be collapsed
    pub aggregation: Option<AggregationFunction>,
    table: OnceCell<String>,
}

impl VariableMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conversion: None,
            aggregation: None,
            table: OnceCell::new(),
        }
    }

    pub fn with_conversion(mut self, factor: f64) -> Self {
        self.conversion = Some(factor);
        self
    }

    pub fn with_aggregation(mut self, function: AggregationFunction) -> Self {
        self.aggregation = Some(function);
        self
    }

    /// Pin the owning table instead of looking it up.
    pub fn with_table(self, table: impl Into<String>) -> Self {
        let _ = self.table.set(table.into());
        self
    }

    /// Owning table if it has already been resolved.
    pub fn table(&self) -> Option<&str> {
        self.table.get().map(String::as_str)
    }

    /// Name of the table declaring this variable, resolved on first call and
    /// cached afterwards.
    pub fn owning_table<S: AsRef<str>>(&self, headers: &[(S, Vec<String>)]) -> EngineResult<&str> {
        self.table
            .get_or_try_init(|| locate_table(&self.name, headers))
            .map(String::as_str)
    }
}

/// Parse every `ICASA:` line of a value-type comment.
///
/// Each line yields its own result so one bad aggregation name does not hide
/// the other variables.
pub fn parse_variable_comment(comment: &str) -> Vec<EngineResult<VariableMetadata>> {
    ICASA_COMMENT
        .captures_iter(comment)
        .map(|caps| -> EngineResult<VariableMetadata> {
            let name = caps["name"].trim().to_string();
            let mut meta = VariableMetadata::new(name.clone());

            if let Some(factor) = caps.name("conversion") {
                let factor: f64 = factor
                    .as_str()
                    .parse()
                    .map_err(|_| EngineError::invalid_field(&name, "unparseable conversion factor"))?;
                meta = meta.with_conversion(factor);
            }
            if let Some(agg) = caps.name("aggregation") {
                let function = agg
                    .as_str()
                    .parse::<AggregationFunction>()
                    .map_err(|e: String| EngineError::invalid_field(&name, e))?;
                meta = meta.with_aggregation(function);
            }
            Ok(meta)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let parsed = parse_variable_comment("Plant height\nICASA: PHTD*100, mean\n");
        assert_eq!(parsed.len(), 1);
        let meta = parsed[0].as_ref().unwrap();
        assert_eq!(meta.name, "PHTD");
        assert_eq!(meta.conversion, Some(100.0));
        assert_eq!(meta.aggregation, Some(AggregationFunction::Mean));
    }

    #[test]
    fn test_parse_optional_parts() {
        let parsed = parse_variable_comment("ICASA: SWCD\nICASA: TMAX, max\nICASA: RAIN*0.1");
        let metas: Vec<_> = parsed.into_iter().map(Result::unwrap).collect();
        assert_eq!(metas.len(), 3);
        assert_eq!(metas[0].name, "SWCD");
        assert!(metas[0].conversion.is_none());
        assert!(metas[0].aggregation.is_none());
        assert_eq!(metas[1].aggregation, Some(AggregationFunction::Max));
        assert_eq!(metas[2].conversion, Some(0.1));
    }

    #[test]
    fn test_unknown_aggregation_is_field_local() {
        let parsed = parse_variable_comment("ICASA: PHTD, median\nICASA: SWCD, sum");
        assert_eq!(parsed.len(), 2);
        let err = parsed[0].as_ref().unwrap_err();
        assert!(err.is_field_local());
        assert!(parsed[1].is_ok());
    }

    #[test]
    fn test_comment_without_icasa_lines() {
        assert!(parse_variable_comment("free text only").is_empty());
    }

    #[test]
    fn test_aggregation_apply() {
        let samples = [10.0, 20.0, 30.0];
        assert_eq!(AggregationFunction::Mean.apply(&samples), Some(20.0));
        assert_eq!(AggregationFunction::Sum.apply(&samples), Some(60.0));
        assert_eq!(AggregationFunction::Min.apply(&samples), Some(10.0));
        assert_eq!(AggregationFunction::Max.apply(&samples), Some(30.0));
        assert_eq!(AggregationFunction::Mean.apply(&[]), None);
    }

    #[test]
    fn test_mean_of_large_samples_stays_finite() {
        let samples = [1e308, 1e308];
        assert_eq!(AggregationFunction::Mean.apply(&samples), Some(1e308));
        assert_eq!(AggregationFunction::Sum.apply(&samples), Some(f64::INFINITY));
    }

    #[test]
    fn test_owning_table_is_cached() {
        let headers = vec![
            ("soil".to_string(), vec!["SWCD".to_string()]),
            ("plant".to_string(), vec!["PHTD".to_string()]),
        ];
        let meta = VariableMetadata::new("PHTD");
        assert_eq!(meta.table(), None);
        assert_eq!(meta.owning_table(&headers).unwrap(), "plant");
        assert_eq!(meta.table(), Some("plant"));

        // Cached: a later lookup against different headers keeps the first answer
        let other: Vec<(String, Vec<String>)> = Vec::new();
        assert_eq!(meta.owning_table(&other).unwrap(), "plant");
    }

    #[test]
    fn test_pinned_table_skips_lookup() {
        let meta = VariableMetadata::new("PHTD").with_table("Plant_growth");
        let headers: Vec<(&str, Vec<String>)> = Vec::new();
        assert_eq!(meta.owning_table(&headers).unwrap(), "Plant_growth");
    }

    #[test]
    fn test_owning_table_miss() {
        let headers: Vec<(&str, Vec<String>)> = vec![("soil", vec!["SWCD".to_string()])];
        let meta = VariableMetadata::new("PHTD");
        assert_eq!(
            meta.owning_table(&headers).unwrap_err(),
            EngineError::FieldNotFound("PHTD".into())
        );
    }
}
