//! Transformation module.
//!
//! Leaf-first stages of a reconciliation:
//! - Mapper: local names and ids to canonical ones
//! - Convert: unit factors
//! - Aggregate: one row per identity and day
//! - Keys: merge key resolution
//! - Reconcile: outer join into the template
//! - Pipeline: orchestration with skip-and-continue diagnostics

pub mod aggregate;
pub mod convert;
pub mod keys;
pub mod mapper;
pub mod pipeline;
pub mod reconcile;

pub use aggregate::{aggregate, split_timestamp, AggregateSpec, Statistic, SAMPLE_COUNT_COLUMN, STDEV_SUFFIX};
pub use convert::{convert, convert_field, invert, UnitFactors};
pub use keys::{resolve_key, KeyFields, KeyStrategy};
pub use mapper::{map_fields, map_identity, NameMap};
pub use pipeline::*;
pub use reconcile::{reconcile, reconcile_detailed, ReconcileStats, Reconciliation};
