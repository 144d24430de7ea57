//! ICASA template structure.
//!
//! A template is a set of named sheets. Each sheet carries three preamble
//! rows (the third holds units) and declares its variables on the fourth
//! row, which is the header of the sheet's table.
//!
//! - [`locate_table`] - which sheet declares a variable
//! - [`workbook`] - sheets on disk
//! - [`glossary`] - variable/unit listing of a workbook

pub mod glossary;
pub mod workbook;

use crate::error::{EngineError, EngineResult};

pub use glossary::{build_glossary, enrich_glossary, GLOSSARY_COLUMNS};
pub use workbook::{TemplateSheet, TemplateWorkbook, HEADER_ROW, PREAMBLE_ROWS, UNIT_ROW};

/// Name of the table whose header row declares `field`.
///
/// Headers are matched exactly. When several tables declare the same field,
/// the last one in the given order wins.
pub fn locate_table<S: AsRef<str>>(field: &str, tables: &[(S, Vec<String>)]) -> EngineResult<String> {
    tables
        .iter()
        .filter(|(_, header)| header.iter().any(|h| h == field))
        .last()
        .map(|(name, _)| name.as_ref().to_string())
        .ok_or_else(|| EngineError::FieldNotFound(field.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<(&'static str, Vec<String>)> {
        vec![
            ("Management", vec!["TRTNO".into(), "PDATE".into()]),
            ("Plant_growth", vec!["TRTNO".into(), "DATE".into(), "PHTD".into()]),
            ("Soil_profile", vec!["SLLB".into(), "PHTD".into()]),
        ]
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(locate_table("PDATE", &headers()).unwrap(), "Management");
        assert!(matches!(
            locate_table("phtd", &headers()),
            Err(EngineError::FieldNotFound(_))
        ));
    }

    #[test]
    fn test_last_match_wins() {
        assert_eq!(locate_table("PHTD", &headers()).unwrap(), "Soil_profile");
        assert_eq!(locate_table("TRTNO", &headers()).unwrap(), "Plant_growth");
    }

    #[test]
    fn test_not_found_is_field_local() {
        let err = locate_table("LAID", &headers()).unwrap_err();
        assert!(err.is_field_local());
    }
}
