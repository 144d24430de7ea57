//! CSV to [`Table`] parser with encoding and delimiter auto-detection.
//!
//! Sheets may start with preamble rows above the header row. ICASA
//! template sheets carry three (description, notes, units) so their header
//! is row index 3; plain input tables use row index 0.

use std::io::Write;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::{Table, Value};

const SEPARATORS: [char; 4] = [';', ',', '\t', '|'];

/// Lines inspected when guessing the delimiter.
const DELIMITER_SAMPLE_LINES: usize = 5;

/// A parsed sheet with its preamble and detection metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSheet {
    /// Raw rows above the header row
    pub preamble: Vec<Vec<String>>,
    /// Header row plus typed data rows
    pub table: Table,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    /// Data cells as they were read
    pub source: SourceText,
}

/// Cell text of a sheet as read, aligned with its typed rows.
///
/// Typing is lossy (`007` reads as 7, `0.10` as 0.1), so a cell whose value
/// is unchanged is written back from this text instead of being re-rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceText {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl SourceText {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Text to write for `value` at `row` of `column`: the text read there if
    /// it still types to `value`, otherwise the value's own rendering.
    pub fn render(&self, row: usize, column: Option<usize>, value: &Value) -> String {
        column
            .and_then(|c| self.rows.get(row)?.get(c))
            .filter(|text| Value::infer(text) == *value)
            .cloned()
            .unwrap_or_else(|| value.to_string())
    }

    /// Source column index for each column of `table`.
    fn column_map(&self, table: &Table) -> Vec<Option<usize>> {
        table
            .columns()
            .iter()
            .map(|name| self.columns.iter().position(|c| c == name))
            .collect()
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => Ok(String::from_utf8(bytes.to_vec())
            .unwrap_or_else(|_| String::from_utf8_lossy(bytes).to_string())),
        // WHATWG maps the latin1 labels onto windows-1252
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.to_string())
        }
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(enc) => {
                let (text, _, had_errors) = enc.decode(bytes);
                if had_errors {
                    return Err(CsvError::Encoding(format!("invalid {} byte sequence", enc.name())));
                }
                Ok(text.to_string())
            }
            None => {
                log::warn!("Unknown encoding '{}', decoding as UTF-8", label);
                Ok(String::from_utf8_lossy(bytes).to_string())
            }
        },
    }
}

/// Detect the delimiter by counting occurrences in the first lines
pub fn detect_delimiter(content: &str) -> char {
    let sample: Vec<&str> = content.lines().take(DELIMITER_SAMPLE_LINES).collect();

    let mut best_sep = ';';
    let mut best_count = 0;

    for &sep in &SEPARATORS {
        let count: usize = sample.iter().map(|line| line.matches(sep).count()).sum();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text whose header sits at row index `header_row`.
///
/// Rows above the header are kept verbatim as the preamble. Cells are typed
/// with [`Value::infer`]; blank data rows are skipped. Trailing unnamed
/// header cells are dropped, as are the matching data cells.
pub fn parse_table(content: &str, delimiter: char, header_row: usize) -> CsvResult<Table> {
    parse_sheet(content, delimiter, header_row).map(|sheet| sheet.table)
}

struct SheetParts {
    preamble: Vec<Vec<String>>,
    table: Table,
    source: SourceText,
}

fn parse_sheet(content: &str, delimiter: char, header_row: usize) -> CsvResult<SheetParts> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let mut preamble: Vec<Vec<String>> = Vec::with_capacity(header_row);
    for _ in 0..header_row {
        match records.next() {
            Some(record) => preamble.push(record?.iter().map(str::to_string).collect()),
            None => return Err(CsvError::NoHeaders(header_row + 1)),
        }
    }

    let header = match records.next() {
        Some(record) => record?,
        None => return Err(CsvError::NoHeaders(header_row + 1)),
    };
    let columns = header_columns(&header, header_row)?;

    let mut table = Table::new(columns.clone());
    let mut source_rows = Vec::new();
    for (offset, record) in records.enumerate() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if record.len() > columns.len() && record.iter().skip(columns.len()).any(|c| !c.trim().is_empty()) {
            log::debug!(
                "Row {} has {} cells for {} columns, extra cells dropped",
                header_row + offset + 2,
                record.len(),
                columns.len()
            );
        }
        let cells: Vec<String> = record.iter().take(columns.len()).map(str::to_string).collect();
        table.push_row(cells.iter().map(|c| Value::infer(c)).collect());
        source_rows.push(cells);
    }

    Ok(SheetParts {
        preamble,
        table,
        source: SourceText::new(columns, source_rows),
    })
}

fn header_columns(header: &csv::StringRecord, header_row: usize) -> CsvResult<Vec<String>> {
    let mut names: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    while names.last().is_some_and(|n| n.is_empty()) {
        names.pop();
    }
    if names.is_empty() {
        return Err(CsvError::NoHeaders(header_row + 1));
    }

    for (i, name) in names.iter().enumerate() {
        if name.is_empty() {
            return Err(CsvError::Parse {
                line: header_row + 1,
                message: format!("column {} has no name", i + 1),
            });
        }
        if names[..i].contains(name) {
            return Err(CsvError::Parse {
                line: header_row + 1,
                message: format!("duplicate column '{}'", name),
            });
        }
    }
    Ok(names)
}

fn delimiter_byte(delimiter: char) -> CsvResult<u8> {
    u8::try_from(delimiter).map_err(|_| CsvError::Parse {
        line: 0,
        message: format!("delimiter '{}' is not a single byte", delimiter),
    })
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8], header_row: usize) -> CsvResult<ParsedSheet> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }

    // Detect encoding
    let encoding = detect_encoding(bytes);

    // Decode content
    let content = decode_content(bytes, &encoding)?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    // Detect delimiter
    let delimiter = detect_delimiter(content);

    let sheet = parse_sheet(content, delimiter, header_row)?;
    Ok(ParsedSheet {
        preamble: sheet.preamble,
        table: sheet.table,
        encoding,
        delimiter,
        source: sheet.source,
    })
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
pub fn parse_file_auto<P: AsRef<Path>>(path: P, header_row: usize) -> CsvResult<ParsedSheet> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes, header_row)
}

/// Write preamble rows, the header and the data rows.
///
/// Dates are written `yyyy-mm-dd`, times `hh:mm:ss`, missing values as
/// empty cells.
pub fn write_table<W: Write>(writer: W, preamble: &[Vec<String>], table: &Table, delimiter: char) -> CsvResult<()> {
    write_table_preserving(writer, preamble, table, &SourceText::default(), delimiter)
}

/// Same as [`write_table`], but cells still holding the value read from
/// `source` keep their original text.
pub fn write_table_preserving<W: Write>(
    writer: W,
    preamble: &[Vec<String>],
    table: &Table,
    source: &SourceText,
    delimiter: char,
) -> CsvResult<()> {
    let column_map = source.column_map(table);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .flexible(true)
        .from_writer(writer);

    for row in preamble {
        writer.write_record(row)?;
    }
    writer.write_record(table.columns())?;
    for (r, row) in table.rows().iter().enumerate() {
        writer.write_record(row.iter().zip(&column_map).map(|(v, &c)| source.render(r, c, v)))?;
    }
    writer.flush()?;
    Ok(())
}

/// Render a table to a CSV string.
pub fn table_to_string(preamble: &[Vec<String>], table: &Table, delimiter: char) -> CsvResult<String> {
    let mut buf = Vec::new();
    write_table(&mut buf, preamble, table, delimiter)?;
    String::from_utf8(buf).map_err(|e| CsvError::Encoding(e.to_string()))
}

/// Write a table to `path`, replacing the file.
pub fn write_file<P: AsRef<Path>>(path: P, preamble: &[Vec<String>], table: &Table, delimiter: char) -> CsvResult<()> {
    write_file_preserving(path, preamble, table, &SourceText::default(), delimiter)
}

/// [`write_file`] keeping the original text of unchanged cells.
pub fn write_file_preserving<P: AsRef<Path>>(
    path: P,
    preamble: &[Vec<String>],
    table: &Table,
    source: &SourceText,
    delimiter: char,
) -> CsvResult<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_table_preserving(std::io::BufWriter::new(file), preamble, table, source, delimiter)
}
