//! Rename caller-local field names and entity identifiers to their canonical
//! ICASA counterparts.
//!
//! A [`NameMap`] is an ordered list of `(local, canonical)` pairs. When the
//! same local name appears twice, the first pair wins.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::{Table, Value};

/// Ordered `local -> canonical` lookup table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameMap {
    entries: Vec<(String, String)>,
}

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
        }
    }

    /// Build from a two-column mapping table: canonical name in the first
    /// column, local name in the second. Rows missing either side are skipped.
    pub fn from_table(table: &Table) -> EngineResult<Self> {
        if table.columns().len() < 2 {
            return Err(EngineError::missing_column("local name", "mapping"));
        }
        let entries = table
            .rows()
            .iter()
            .filter(|row| row[0].is_present() && row[1].is_present())
            .map(|row| (row[1].to_string(), row[0].to_string()))
            .collect();
        Ok(Self { entries })
    }

    pub fn push(&mut self, local: impl Into<String>, canonical: impl Into<String>) {
        self.entries.push((local.into(), canonical.into()));
    }

    /// Canonical name for `local`, using the first matching entry.
    pub fn get(&self, local: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == local)
            .map(|(_, c)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rename columns through `field_map`. Unmapped columns keep their names.
///
/// Fails if two columns end up with the same name.
pub fn map_fields(mut table: Table, field_map: &NameMap) -> EngineResult<Table> {
    if field_map.is_empty() {
        return Ok(table);
    }

    let renamed: Vec<String> = table
        .columns()
        .iter()
        .map(|c| field_map.get(c).unwrap_or(c.as_str()).to_string())
        .collect();

    for (i, name) in renamed.iter().enumerate() {
        if renamed[..i].contains(name) {
            return Err(EngineError::invalid_field(
                name,
                "more than one column maps to this name",
            ));
        }
    }

    table.set_columns(renamed);
    Ok(table)
}

/// Replace entity identifiers in `id_field` through `id_map`.
///
/// Identifiers are looked up by their text form, so a numeric site id `3817`
/// matches the key `"3817"`. The canonical id is re-typed with
/// [`Value::infer`]. Missing ids and ids without an entry are left alone, as
/// is a table without `id_field`.
pub fn map_identity(mut table: Table, id_field: &str, id_map: &NameMap) -> EngineResult<Table> {
    let Some(idx) = table.column_index(id_field) else {
        log::debug!("No '{}' column, identity mapping skipped", id_field);
        return Ok(table);
    };

    for row in table.rows_mut() {
        if row[idx].is_missing() {
            continue;
        }
        if let Some(canonical) = id_map.get(&row[idx].to_string()) {
            row[idx] = Value::infer(canonical);
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> Table {
        Table::from_rows(
            ["plot", "day", "height_cm"],
            vec![
                vec!["A1".into(), "2025-06-01".into(), 120.0.into()],
                vec![3817.into(), "2025-06-01".into(), 80.0.into()],
                vec![Value::Missing, "2025-06-02".into(), 95.0.into()],
            ],
        )
    }

    #[test]
    fn test_map_fields_renames() {
        let map = NameMap::from_pairs([("plot", "TRTNO"), ("height_cm", "PHTD")]);
        let mapped = map_fields(input(), &map).unwrap();
        assert_eq!(mapped.columns(), ["TRTNO", "day", "PHTD"]);
        assert_eq!(mapped.rows(), input().rows());
    }

    #[test]
    fn test_first_occurrence_wins() {
        let map = NameMap::from_pairs([("height_cm", "PHTD"), ("height_cm", "CHTD")]);
        assert_eq!(map.get("height_cm"), Some("PHTD"));
        let mapped = map_fields(input(), &map).unwrap();
        assert!(mapped.has_column("PHTD"));
        assert!(!mapped.has_column("CHTD"));
    }

    #[test]
    fn test_collision_rejected() {
        let map = NameMap::from_pairs([("plot", "day")]);
        let err = map_fields(input(), &map).unwrap_err();
        assert!(matches!(err, EngineError::InvalidField { ref field, .. } if field == "day"));
    }

    #[test]
    fn test_map_identity() {
        let map = NameMap::from_pairs([("A1", "1"), ("3817", "2"), ("A1", "99")]);
        let mapped = map_identity(input(), "plot", &map).unwrap();
        assert_eq!(mapped.value(0, "plot"), &Value::Number(1.0));
        assert_eq!(mapped.value(1, "plot"), &Value::Number(2.0));
        assert_eq!(mapped.value(2, "plot"), &Value::Missing);
    }

    #[test]
    fn test_map_identity_without_field() {
        let map = NameMap::from_pairs([("A1", "1")]);
        let mapped = map_identity(input(), "TRTNO", &map).unwrap();
        assert_eq!(mapped, input());
    }

    #[test]
    fn test_from_table_reads_canonical_first() {
        let table = Table::from_rows(
            ["ICASA", "local"],
            vec![
                vec!["PHTD".into(), "height_cm".into()],
                vec!["LAID".into(), Value::Missing],
                vec!["CHTD".into(), "height_cm".into()],
            ],
        );
        let map = NameMap::from_table(&table).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("height_cm"), Some("PHTD"));
    }

    #[test]
    fn test_name_map_json_shape() {
        let map: NameMap = serde_json::from_str(r#"[["plot", "TRTNO"]]"#).unwrap();
        assert_eq!(map.get("plot"), Some("TRTNO"));
    }
}
