//! Error types for the ICASA reconciliation engine.
//!
//! The hierarchy mirrors the layers of the crate:
//!
//! - [`EngineError`] - Reconciliation engine errors (conversion, aggregation, merge)
//! - [`CsvError`] - CSV collaborator errors (reading and writing tables)
//! - [`ConfigError`] - Configuration parsing and schema validation errors
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Engine Errors
// =============================================================================

/// Errors raised by the reconciliation engine itself.
///
/// [`EngineError::InvalidField`] and [`EngineError::FieldNotFound`] concern a
/// single field or variable; the orchestrator skips that variable and carries
/// on. The remaining variants invalidate a whole table and abort its merge.
/// A missing structural column is one of those: it says the table itself is
/// malformed, not that one field holds bad values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A field holds values of the wrong type for the requested operation.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// Nothing to aggregate. Usually means the upstream fetch returned no rows.
    #[error("No rows available for aggregation")]
    EmptyInput,

    /// No identity field is shared by the tables, so rows cannot be aligned.
    #[error("Cannot resolve a merge key: identity field '{0}' is not available")]
    NoIdentityField(String),

    /// Two rows of one table share a key tuple.
    #[error("Duplicate key {key} in {table} table; aggregate before merging")]
    KeyCollision { table: String, key: String },

    /// No template table declares the field in its header row.
    #[error("Field '{0}' is not declared by any template table")]
    FieldNotFound(String),

    /// A column the operation is structured around (grouping, key,
    /// timestamp) is absent from a table.
    #[error("Column '{field}' is missing from the {table} table")]
    MissingColumn { field: String, table: String },
}

impl EngineError {
    /// Shorthand for [`EngineError::InvalidField`].
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`EngineError::MissingColumn`].
    pub fn missing_column(field: impl Into<String>, table: impl Into<String>) -> Self {
        Self::MissingColumn {
            field: field.into(),
            table: table.into(),
        }
    }

    /// Whether the error only concerns one field or variable.
    ///
    /// Field-local errors downgrade to skip-and-continue; everything else
    /// aborts the reconciliation of the affected table.
    pub fn is_field_local(&self) -> bool {
        matches!(self, Self::InvalidField { .. } | Self::FieldNotFound(_))
    }
}

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors from the CSV collaborator.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read or write a file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the file content.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// Malformed CSV content.
    #[error("Invalid CSV at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// The header row is missing or blank.
    #[error("No header row found (expected at row {0})")]
    NoHeaders(usize),

    /// Low-level error from the csv crate.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error while reading a manifest.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading a reconciliation configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON or does not deserialize.
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration does not match the embedded schema.
    #[error("Configuration failed validation: {}", errors.join("; "))]
    Schema { errors: Vec<String> },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level orchestration errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Engine error.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The template workbook has no sheet with this name.
    #[error("Unknown template sheet: {0}")]
    UnknownSheet(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // EngineError -> PipelineError
        let engine_err = EngineError::EmptyInput;
        let pipeline_err: PipelineError = engine_err.into();
        assert!(pipeline_err.to_string().contains("No rows"));

        // CsvError -> PipelineError
        let csv_err = CsvError::NoHeaders(4);
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("row 4"));
    }

    #[test]
    fn test_field_local_classification() {
        assert!(EngineError::invalid_field("PHTD", "not numeric").is_field_local());
        assert!(EngineError::FieldNotFound("PHTD".into()).is_field_local());
        assert!(!EngineError::EmptyInput.is_field_local());
        assert!(!EngineError::missing_column("site", "observation").is_field_local());
        assert!(!EngineError::NoIdentityField("TRTNO".into()).is_field_local());
        assert!(!EngineError::KeyCollision {
            table: "new".into(),
            key: "(1)".into()
        }
        .is_field_local());
    }

    #[test]
    fn test_invalid_field_format() {
        let err = EngineError::invalid_field("PHTD", "value 'tall' is not numeric");
        let msg = err.to_string();
        assert!(msg.contains("PHTD"));
        assert!(msg.contains("not numeric"));
    }

    #[test]
    fn test_schema_error_joins_messages() {
        let err = ConfigError::Schema {
            errors: vec!["a is required".into(), "b must be boolean".into()],
        };
        assert_eq!(
            err.to_string(),
            "Configuration failed validation: a is required; b must be boolean"
        );
    }
}
