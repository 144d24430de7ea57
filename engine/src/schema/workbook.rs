//! Template workbook stored as a directory of CSV sheets.
//!
//! ```text
//! template/
//! ├── workbook.json        optional, declares sheet order
//! ├── Management.csv
//! └── Plant_growth.csv
//! ```
//!
//! Without a manifest, every `*.csv` file is a sheet and sheets are ordered
//! by file name.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CsvResult, PipelineError, PipelineResult};
use crate::models::Table;
use crate::parser::{parse_file_auto, write_file_preserving, SourceText};

/// Number of rows above the header row.
pub const PREAMBLE_ROWS: usize = 3;

/// Row index of the header (variable names).
pub const HEADER_ROW: usize = PREAMBLE_ROWS;

/// Row index of the units, inside the preamble.
pub const UNIT_ROW: usize = 2;

/// Manifest file name inside a workbook directory.
pub const MANIFEST_FILE: &str = "workbook.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    sheets: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    name: String,
    /// Defaults to `<name>.csv`
    #[serde(default)]
    file: Option<String>,
}

/// One template sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSheet {
    pub name: String,
    /// Rows above the header, written back unchanged
    pub preamble: Vec<Vec<String>>,
    pub table: Table,
    pub delimiter: char,
    /// File the sheet was read from
    pub path: Option<PathBuf>,
    /// Cell text as read from `path`
    pub source: SourceText,
}

impl TemplateSheet {
    pub fn new(name: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            preamble: vec![Vec::new(); PREAMBLE_ROWS],
            table,
            delimiter: ';',
            path: None,
            source: SourceText::default(),
        }
    }

    pub fn with_preamble(mut self, preamble: Vec<Vec<String>>) -> Self {
        self.preamble = preamble;
        self
    }

    pub fn load(name: impl Into<String>, path: &Path) -> CsvResult<Self> {
        let parsed = parse_file_auto(path, HEADER_ROW)?;
        Ok(Self {
            name: name.into(),
            preamble: parsed.preamble,
            table: parsed.table,
            delimiter: parsed.delimiter,
            path: Some(path.to_path_buf()),
            source: parsed.source,
        })
    }

    /// Write the sheet to `path`. Cells the table still holds as read keep
    /// their original text.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> CsvResult<()> {
        write_file_preserving(path, &self.preamble, &self.table, &self.source, self.delimiter)
    }

    /// Write the sheet back to the file it came from.
    pub fn save(&self) -> CsvResult<()> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("sheet '{}' has no file", self.name),
            )
            .into()),
        }
    }

    /// Unit declared for each header column, from the unit row.
    pub fn units(&self) -> Vec<String> {
        let row = self.preamble.get(UNIT_ROW);
        (0..self.table.columns().len())
            .map(|i| {
                row.and_then(|r| r.get(i))
                    .map(|u| u.trim().to_string())
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// Ordered collection of template sheets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateWorkbook {
    sheets: Vec<TemplateSheet>,
}

impl TemplateWorkbook {
    pub fn new(sheets: Vec<TemplateSheet>) -> Self {
        Self { sheets }
    }

    /// Load every sheet of a workbook directory.
    pub fn load<P: AsRef<Path>>(dir: P) -> CsvResult<Self> {
        let dir = dir.as_ref();
        let manifest_path = dir.join(MANIFEST_FILE);

        let entries: Vec<(String, PathBuf)> = if manifest_path.is_file() {
            let manifest: Manifest = serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;
            manifest
                .sheets
                .into_iter()
                .map(|e| {
                    let file = e.file.unwrap_or_else(|| format!("{}.csv", e.name));
                    (e.name, dir.join(file))
                })
                .collect()
        } else {
            let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
                .collect();
            files.sort();
            files
                .into_iter()
                .filter_map(|p| {
                    let stem = p.file_stem()?.to_string_lossy().to_string();
                    Some((stem, p))
                })
                .collect()
        };

        let mut sheets = Vec::with_capacity(entries.len());
        for (name, path) in entries {
            log::debug!("Loading sheet '{}' from {}", name, path.display());
            sheets.push(TemplateSheet::load(name, &path)?);
        }
        Ok(Self { sheets })
    }

    pub fn sheets(&self) -> &[TemplateSheet] {
        &self.sheets
    }

    /// Sheet names in declared order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&TemplateSheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut TemplateSheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    /// `(sheet name, header row)` pairs in declared order, for
    /// [`locate_table`](super::locate_table).
    pub fn headers(&self) -> Vec<(String, Vec<String>)> {
        self.sheets
            .iter()
            .map(|s| (s.name.clone(), s.table.columns().to_vec()))
            .collect()
    }

    /// Replace the table of a sheet, keeping its preamble.
    pub fn replace_table(&mut self, name: &str, table: Table) -> PipelineResult<()> {
        let sheet = self
            .sheet_mut(name)
            .ok_or_else(|| PipelineError::UnknownSheet(name.to_string()))?;
        sheet.table = table;
        Ok(())
    }

    /// Persist one sheet to its file.
    pub fn save_sheet(&self, name: &str) -> PipelineResult<()> {
        let sheet = self
            .sheet(name)
            .ok_or_else(|| PipelineError::UnknownSheet(name.to_string()))?;
        sheet.save()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn write(dir: &Path, file: &str, content: &str) {
        std::fs::write(dir.join(file), content).unwrap();
    }

    #[test]
    fn test_load_in_file_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b_Plant.csv", "t;;\nn;;\nnumber;date;cm\nTRTNO;DATE;PHTD\n1;2025-06-01;120\n");
        write(dir.path(), "a_Mgmt.csv", "t;\nn;\nnumber;date\nTRTNO;PDATE\n");
        write(dir.path(), "notes.txt", "ignored");

        let wb = TemplateWorkbook::load(dir.path()).unwrap();
        assert_eq!(wb.sheet_names(), vec!["a_Mgmt", "b_Plant"]);

        let plant = wb.sheet("b_Plant").unwrap();
        assert_eq!(plant.units(), vec!["number", "date", "cm"]);
        assert_eq!(plant.table.value(0, "PHTD"), &Value::Number(120.0));
        assert!(wb.sheet("a_Mgmt").unwrap().table.is_empty());
    }

    #[test]
    fn test_manifest_declares_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "one.csv", "t\nn\nu\nTRTNO\n");
        write(dir.path(), "two.csv", "t\nn\nu\nTRTNO\n");
        write(
            dir.path(),
            MANIFEST_FILE,
            r#"{"sheets": [{"name": "Second", "file": "two.csv"}, {"name": "one"}]}"#,
        );

        let wb = TemplateWorkbook::load(dir.path()).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Second", "one"]);
        assert_eq!(wb.headers()[0], ("Second".to_string(), vec!["TRTNO".to_string()]));
    }

    #[test]
    fn test_save_sheet_keeps_preamble() {
        let dir = tempfile::tempdir().unwrap();
        let content = "title;;\nnotes;;\nnumber;date;cm\nTRTNO;DATE;PHTD\n1;2025-06-01;120\n";
        write(dir.path(), "Plant.csv", content);

        let mut wb = TemplateWorkbook::load(dir.path()).unwrap();
        let mut table = wb.sheet("Plant").unwrap().table.clone();
        table.push_row(vec![2.into(), Value::infer("2025-06-02"), 95.5.into()]);
        wb.replace_table("Plant", table).unwrap();
        wb.save_sheet("Plant").unwrap();

        let written = std::fs::read_to_string(dir.path().join("Plant.csv")).unwrap();
        assert_eq!(written, format!("{}2;2025-06-02;95.5\n", content));
    }

    #[test]
    fn test_noop_merge_writes_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let content = "title;;;\nnotes;;;\nnumber;date;code;m\nTRTNO;DATE;CODE;PHTD\n007;2025-06-01;1e3;0.10\n";
        write(dir.path(), "Plant.csv", content);

        let mut wb = TemplateWorkbook::load(dir.path()).unwrap();
        let stored = wb.sheet("Plant").unwrap().table.clone();
        let blank = Table::from_rows(
            ["TRTNO", "DATE", "CODE", "PHTD"],
            vec![vec![7.into(), Value::infer("2025-06-01"), Value::Missing, Value::Missing]],
        );
        let key = vec!["TRTNO".to_string(), "DATE".to_string()];
        let merged = crate::transform::reconcile(&stored, &blank, &key, true).unwrap();
        wb.replace_table("Plant", merged).unwrap();
        wb.save_sheet("Plant").unwrap();

        let written = std::fs::read_to_string(dir.path().join("Plant.csv")).unwrap();
        assert_eq!(written, content);
    }

    #[test]
    fn test_unknown_sheet() {
        let mut wb = TemplateWorkbook::default();
        assert!(matches!(
            wb.replace_table("Nope", Table::default()),
            Err(PipelineError::UnknownSheet(_))
        ));
    }
}
