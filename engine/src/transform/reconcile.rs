//! Outer join of new data into a template table.
//!
//! Rows are aligned on a resolved key. For every non-key field the two
//! tables share, the first non-missing value in policy order wins:
//!
//! | overwrite | order               |
//! |-----------|---------------------|
//! | `false`   | template, then new  |
//! | `true`    | new, then template  |
//!
//! The result has exactly the template's columns. Template rows keep their
//! order; rows only present in the new table follow in their own order.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::models::{format_key, Table, Value};

/// Counters describing one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Template rows that found a partner in the new table
    pub matched: usize,
    /// New-only rows appended to the template
    pub inserted: usize,
    /// Missing template cells filled from new data
    pub filled: usize,
    /// Present template cells replaced by a different new value
    pub overwritten: usize,
}

impl ReconcileStats {
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.filled == 0 && self.overwritten == 0
    }
}

/// Merged table plus what changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub table: Table,
    pub stats: ReconcileStats,
}

/// Merge `new` into `template` on `key`.
pub fn reconcile(template: &Table, new: &Table, key: &[String], overwrite: bool) -> EngineResult<Table> {
    reconcile_detailed(template, new, key, overwrite).map(|r| r.table)
}

/// Same as [`reconcile`], also reporting how many cells and rows changed.
pub fn reconcile_detailed(
    template: &Table,
    new: &Table,
    key: &[String],
    overwrite: bool,
) -> EngineResult<Reconciliation> {
    if key.is_empty() {
        return Err(EngineError::NoIdentityField("<empty key>".to_string()));
    }
    let template_key = key_indices(template, key, "template")?;
    let new_key = key_indices(new, key, "new")?;

    let template_rows = index_rows(template, &template_key, "template")?;
    let new_rows = index_rows(new, &new_key, "new")?;

    // (template column, new column) for every shared non-key field
    let shared: Vec<(usize, usize)> = template
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| !key.contains(c))
        .filter_map(|(ti, c)| new.column_index(c).map(|ni| (ti, ni)))
        .collect();

    let mut stats = ReconcileStats::default();
    let mut merged = template.clone();

    for (row_idx, row) in merged.rows_mut().iter_mut().enumerate() {
        let row_key = template.key_of(row_idx, &template_key);
        let Some(&partner) = new_rows.get(&row_key) else {
            continue;
        };
        stats.matched += 1;

        let incoming = &new.rows()[partner];
        for &(ti, ni) in &shared {
            let current = &row[ti];
            let candidate = &incoming[ni];
            let chosen = if overwrite {
                first_present(candidate, current)
            } else {
                first_present(current, candidate)
            }
            .clone();
            if chosen == *current {
                continue;
            }
            if current.is_missing() {
                stats.filled += 1;
            } else {
                stats.overwritten += 1;
            }
            row[ti] = chosen;
        }
    }

    let width = template.columns().len();
    for (row_idx, incoming) in new.rows().iter().enumerate() {
        let row_key = new.key_of(row_idx, &new_key);
        if template_rows.contains_key(&row_key) {
            continue;
        }
        let mut row = vec![Value::Missing; width];
        for (&ti, value) in template_key.iter().zip(row_key) {
            row[ti] = value;
        }
        for &(ti, ni) in &shared {
            row[ti] = incoming[ni].clone();
        }
        merged.push_row(row);
        stats.inserted += 1;
    }

    log::debug!(
        "Reconciled on {:?}: {} matched, {} inserted, {} filled, {} overwritten",
        key,
        stats.matched,
        stats.inserted,
        stats.filled,
        stats.overwritten
    );

    Ok(Reconciliation { table: merged, stats })
}

fn first_present<'a>(preferred: &'a Value, fallback: &'a Value) -> &'a Value {
    if preferred.is_present() {
        preferred
    } else {
        fallback
    }
}

fn key_indices(table: &Table, key: &[String], side: &str) -> EngineResult<Vec<usize>> {
    key.iter()
        .map(|k| {
            table
                .column_index(k)
                .ok_or_else(|| EngineError::missing_column(k, side))
        })
        .collect()
}

/// Map every key tuple to its row, rejecting duplicates.
fn index_rows(table: &Table, key: &[usize], side: &str) -> EngineResult<HashMap<Vec<Value>, usize>> {
    let mut index = HashMap::with_capacity(table.len());
    for row in 0..table.len() {
        let row_key = table.key_of(row, key);
        if index.contains_key(&row_key) {
            return Err(EngineError::KeyCollision {
                table: side.to_string(),
                key: format_key(&row_key),
            });
        }
        index.insert(row_key, row);
    }
    Ok(index)
}
