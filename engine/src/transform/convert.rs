//! Unit conversion.
//!
//! Factors are stored as "native units per canonical unit", so a value in
//! native units is divided by its factor to land in canonical units. A
//! centimetre reading with factor `100` becomes metres.

use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};
use crate::models::{Table, Value};

/// Conversion factor per field name.
pub type UnitFactors = BTreeMap<String, f64>;

/// Divide every non-missing value of each listed field by its factor.
///
/// Fields listed in `factors` but absent from the table are ignored; fields
/// not listed are untouched.
pub fn convert(mut table: Table, factors: &UnitFactors) -> EngineResult<Table> {
    for (field, factor) in factors {
        convert_field(&mut table, field, *factor)?;
    }
    Ok(table)
}

/// Convert a single field in place.
///
/// The column is checked before anything is written, so on error the table
/// is unchanged and the caller can drop the field and carry on.
pub fn convert_field(table: &mut Table, field: &str, factor: f64) -> EngineResult<()> {
    let Some(idx) = table.column_index(field) else {
        return Ok(());
    };
    if !factor.is_finite() || factor == 0.0 {
        return Err(EngineError::invalid_field(
            field,
            format!("conversion factor {} is not usable", factor),
        ));
    }

    let mut converted = Vec::with_capacity(table.len());
    for value in table.rows().iter().map(|row| &row[idx]) {
        match value {
            Value::Missing => converted.push(Value::Missing),
            Value::Number(n) if (n / factor).is_finite() => converted.push(Value::Number(n / factor)),
            Value::Number(n) => {
                return Err(EngineError::invalid_field(
                    field,
                    format!("{} / {} is out of range", n, factor),
                ))
            }
            bad => {
                return Err(EngineError::invalid_field(
                    field,
                    format!("cannot convert {} value '{}'", bad.type_name(), bad),
                ))
            }
        }
    }

    for (row, value) in table.rows_mut().iter_mut().zip(converted) {
        row[idx] = value;
    }
    Ok(())
}

/// Reciprocal of every factor. `convert(convert(t, f), invert(f))` restores `t`.
pub fn invert(factors: &UnitFactors) -> UnitFactors {
    factors
        .iter()
        .map(|(field, factor)| (field.clone(), 1.0 / factor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heights() -> Table {
        Table::from_rows(
            ["TRTNO", "PHTD", "NOTE"],
            vec![
                vec![1.into(), 150.0.into(), "ok".into()],
                vec![2.into(), Value::Missing, "lodged".into()],
                vec![3.into(), 0.0.into(), Value::Missing],
            ],
        )
    }

    fn factors(pairs: &[(&str, f64)]) -> UnitFactors {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_divides_by_factor() {
        let converted = convert(heights(), &factors(&[("PHTD", 100.0)])).unwrap();
        assert_eq!(converted.value(0, "PHTD"), &Value::Number(1.5));
        assert_eq!(converted.value(1, "PHTD"), &Value::Missing);
        assert_eq!(converted.value(2, "PHTD"), &Value::Number(0.0));
        // Other columns untouched
        assert_eq!(converted.value(0, "TRTNO"), &Value::Number(1.0));
        assert_eq!(converted.value(1, "NOTE"), &Value::text("lodged"));
    }

    #[test]
    fn test_absent_field_ignored() {
        let converted = convert(heights(), &factors(&[("LAID", 2.0)])).unwrap();
        assert_eq!(converted, heights());
    }

    #[test]
    fn test_non_numeric_field_rejected() {
        let err = convert(heights(), &factors(&[("NOTE", 2.0)])).unwrap_err();
        assert!(matches!(err, EngineError::InvalidField { ref field, .. } if field == "NOTE"));
    }

    #[test]
    fn test_failed_field_leaves_table_unchanged() {
        let mut table = heights();
        assert!(convert_field(&mut table, "NOTE", 2.0).is_err());
        assert_eq!(table, heights());
    }

    #[test]
    fn test_overflowing_result_rejected() {
        let mut table = Table::from_rows(["PHTD"], vec![vec![1e10.into()], vec![2.0.into()]]);
        let before = table.clone();
        let err = convert_field(&mut table, "PHTD", 1e-300).unwrap_err();
        assert!(matches!(err, EngineError::InvalidField { ref field, .. } if field == "PHTD"));
        // Nothing replaced by Missing
        assert_eq!(table, before);
    }

    #[test]
    fn test_zero_factor_rejected() {
        let err = convert(heights(), &factors(&[("PHTD", 0.0)])).unwrap_err();
        assert!(err.is_field_local());
    }

    #[test]
    fn test_round_trip_with_inverse() {
        let f = factors(&[("PHTD", 0.3), ("TRTNO", 7.0)]);
        let there = convert(heights(), &f).unwrap();
        let back = convert(there, &invert(&f)).unwrap();

        for (row, original) in back.rows().iter().zip(heights().rows()) {
            for (a, b) in row.iter().zip(original) {
                match (a, b) {
                    (Value::Number(x), Value::Number(y)) => assert!((x - y).abs() < 1e-9),
                    _ => assert_eq!(a, b),
                }
            }
        }
    }
}
