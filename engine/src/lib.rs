//! # icasa - Reconcile observations into ICASA template tables
//!
//! Measurement records (instrument exports, observation-database exports,
//! hand-filled input sheets) are mapped to canonical ICASA names, converted,
//! aggregated and merged into a template table without losing stored values.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────┐   ┌───────────┐
//! │ raw rows │──▶│  Mapper  │──▶│ Converter │──▶│ Aggregator│──▶│ Keys │──▶│ Reconciler│
//! └──────────┘   └──────────┘   └───────────┘   └───────────┘   └──────┘   └─────┬─────┘
//!                                                                                 │
//!                                         template sheet (via Schema Locator) ◀───┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use icasa::{reconcile, resolve_key, Table};
//!
//! let key = resolve_key(new.columns(), &["TRTNO", "DATE", "RP"])?;
//! let merged = reconcile(&template, &new, &key, false)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Values, tables and variable metadata
//! - [`transform`] - Leaf stages and the orchestration pipeline
//! - [`schema`] - Template workbook, schema locator and glossary
//! - [`parser`] - CSV reading and writing with auto-detection
//! - [`config`] - Reconciliation configuration
//! - [`validation`] - JSON Schema checks
//! - [`logs`] - Batch diagnostics

// Core modules
pub mod error;
pub mod models;

// Engine
pub mod transform;

// Template structure
pub mod schema;

// I/O
pub mod parser;

// Configuration
pub mod config;
pub mod validation;

// Diagnostics
pub mod logs;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ConfigResult, CsvError, CsvResult, EngineError, EngineResult, PipelineError, PipelineResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    format_key, parse_variable_comment, AggregationFunction, Table, Value, VariableMetadata,
};

// =============================================================================
// Re-exports - Engine
// =============================================================================

pub use transform::{
    aggregate, convert, convert_field, invert, map_fields, map_identity, reconcile, reconcile_detailed,
    resolve_key, split_timestamp, AggregateSpec, KeyFields, KeyStrategy, NameMap, ReconcileStats,
    Reconciliation, Statistic, UnitFactors, SAMPLE_COUNT_COLUMN, STDEV_SUFFIX,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    duplicate_keys, import_observations, reconcile_table, BatchReport, ObservationColumns, TableReport,
    VariableOutcome, VariableReport,
};

// =============================================================================
// Re-exports - Schema
// =============================================================================

pub use schema::{
    build_glossary, enrich_glossary, locate_table, TemplateSheet, TemplateWorkbook, GLOSSARY_COLUMNS,
};

// =============================================================================
// Re-exports - CSV
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_file_auto, parse_table,
    write_file, write_file_preserving, write_table, write_table_preserving, ParsedSheet, SourceText,
};

// =============================================================================
// Re-exports - Configuration & Validation
// =============================================================================

pub use config::{example_config, ReconcileConfig, CONFIG_ENV_VAR};
pub use validation::{is_valid, is_valid_reconcile_config, validate, validate_reconcile_config};

// =============================================================================
// Re-exports - Diagnostics
// =============================================================================

pub use logs::{Diagnostics, LogEntry, LogLevel};
