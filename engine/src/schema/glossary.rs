//! Variable glossary of a template workbook.

use std::collections::HashMap;

use super::workbook::TemplateWorkbook;
use crate::error::{EngineError, EngineResult};
use crate::models::{Table, Value};

/// Columns of a freshly built glossary.
pub const GLOSSARY_COLUMNS: [&str; 3] = ["Sheet", "Variable_Name", "Unit_or_type"];

/// One row per declared variable: owning sheet, name and unit.
///
/// Columns with neither a name nor a unit are left out.
pub fn build_glossary(workbook: &TemplateWorkbook) -> Table {
    let mut glossary = Table::new(GLOSSARY_COLUMNS);
    for sheet in workbook.sheets() {
        for (name, unit) in sheet.table.columns().iter().zip(sheet.units()) {
            if name.is_empty() && unit.is_empty() {
                continue;
            }
            glossary.push_row(vec![
                Value::text(sheet.name.as_str()),
                cell(name),
                cell(&unit),
            ]);
        }
    }
    glossary
}

fn cell(s: &str) -> Value {
    if s.is_empty() {
        Value::Missing
    } else {
        Value::text(s)
    }
}

/// Append `extra_columns` looked up in `reference` by variable name.
///
/// `reference` holds the variable names in `variable_column`. When a name
/// occurs more than once the first row is used; names absent from the
/// reference get missing values.
pub fn enrich_glossary<S: AsRef<str>>(
    mut glossary: Table,
    reference: &Table,
    variable_column: &str,
    extra_columns: &[S],
) -> EngineResult<Table> {
    let Some(var_idx) = reference.column_index(variable_column) else {
        return Err(EngineError::missing_column(variable_column, "reference glossary"));
    };
    let extra_idx: Vec<usize> = extra_columns
        .iter()
        .map(|c| {
            reference
                .column_index(c.as_ref())
                .ok_or_else(|| EngineError::missing_column(c.as_ref(), "reference glossary"))
        })
        .collect::<EngineResult<_>>()?;
    let Some(name_idx) = glossary.column_index(GLOSSARY_COLUMNS[1]) else {
        return Err(EngineError::missing_column(GLOSSARY_COLUMNS[1], "glossary"));
    };

    let mut first_row: HashMap<String, usize> = HashMap::new();
    for (i, row) in reference.rows().iter().enumerate() {
        if row[var_idx].is_present() {
            first_row.entry(row[var_idx].to_string()).or_insert(i);
        }
    }

    let width = glossary.columns().len();
    for column in extra_columns {
        glossary.add_column(column.as_ref(), Value::Missing);
    }
    if glossary.columns().len() != width + extra_columns.len() {
        return Err(EngineError::invalid_field(
            "glossary",
            "extra columns clash with existing glossary columns",
        ));
    }

    for row in glossary.rows_mut() {
        let Some(&source) = first_row.get(&row[name_idx].to_string()) else {
            continue;
        };
        for (offset, &idx) in extra_idx.iter().enumerate() {
            row[width + offset] = reference.rows()[source][idx].clone();
        }
    }
    Ok(glossary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TemplateSheet;

    fn workbook() -> TemplateWorkbook {
        let preamble = vec![
            vec!["Plant growth".to_string()],
            vec![],
            vec!["number".to_string(), "date".to_string(), "cm".to_string()],
        ];
        TemplateWorkbook::new(vec![
            TemplateSheet::new("Plant_growth", Table::new(["TRTNO", "DATE", "PHTD"])).with_preamble(preamble),
            TemplateSheet::new("Soil", Table::new(["SLLB"])),
        ])
    }

    #[test]
    fn test_build_glossary() {
        let g = build_glossary(&workbook());
        assert_eq!(g.columns(), GLOSSARY_COLUMNS);
        assert_eq!(g.len(), 4);
        assert_eq!(g.value(2, "Variable_Name"), &Value::text("PHTD"));
        assert_eq!(g.value(2, "Unit_or_type"), &Value::text("cm"));
        // No unit row
        assert_eq!(g.value(3, "Sheet"), &Value::text("Soil"));
        assert_eq!(g.value(3, "Unit_or_type"), &Value::Missing);
    }

    #[test]
    fn test_enrich_uses_first_occurrence() {
        let reference = Table::from_rows(
            ["Variable_Name", "Code_Query", "Description"],
            vec![
                vec!["PHTD".into(), "PH".into(), "Plant height".into()],
                vec!["PHTD".into(), "XX".into(), "Duplicate".into()],
                vec!["TRTNO".into(), Value::Missing, "Treatment number".into()],
            ],
        );
        let g = enrich_glossary(
            build_glossary(&workbook()),
            &reference,
            "Variable_Name",
            &["Code_Query", "Description"],
        )
        .unwrap();

        assert_eq!(g.columns().len(), 5);
        assert_eq!(g.value(2, "Code_Query"), &Value::text("PH"));
        assert_eq!(g.value(2, "Description"), &Value::text("Plant height"));
        assert_eq!(g.value(0, "Description"), &Value::text("Treatment number"));
        // Not in the reference
        assert_eq!(g.value(1, "Description"), &Value::Missing);
    }

    #[test]
    fn test_enrich_unknown_column() {
        let reference = Table::new(["Variable_Name"]);
        let err = enrich_glossary(build_glossary(&workbook()), &reference, "Variable_Name", &["Description"])
            .unwrap_err();
        assert_eq!(err, EngineError::missing_column("Description", "reference glossary"));
    }
}
