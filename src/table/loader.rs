//! Tabular ingestion — uploaded bytes to a typed DataFrame
//!
//! Accepts CSV/TSV and Excel payloads, either with a declared format or by
//! sniffing magic bytes. Column kinds are inferred from cell content:
//! boolean literal sets, numeric parse success, date patterns, with
//! categorical text as the default.

use crate::error::{Result, VisualdataError};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::io::Cursor;

/// Supported input file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Tsv,
    Excel,
    /// Sniff the format from the payload
    Unknown,
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileFormat::Csv => write!(f, "csv"),
            FileFormat::Tsv => write!(f, "tsv"),
            FileFormat::Excel => write!(f, "excel"),
            FileFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// Detect file format from a file name
pub fn detect_format_from_name(name: &str) -> FileFormat {
    let lower = name.to_lowercase();
    if lower.ends_with(".csv") {
        FileFormat::Csv
    } else if lower.ends_with(".tsv") || lower.ends_with(".tab") {
        FileFormat::Tsv
    } else if lower.ends_with(".xlsx")
        || lower.ends_with(".xls")
        || lower.ends_with(".xlsm")
        || lower.ends_with(".ods")
    {
        FileFormat::Excel
    } else {
        FileFormat::Unknown
    }
}

/// Sniff file format from the first bytes
pub fn sniff_format(bytes: &[u8]) -> FileFormat {
    // Excel containers are ZIP archives
    if bytes.starts_with(&[0x50, 0x4B]) {
        return FileFormat::Excel;
    }
    // XLS legacy header (OLE compound file)
    if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return FileFormat::Excel;
    }
    FileFormat::Csv
}

/// Loader for uploaded tabular payloads
pub struct TableLoader {
    delimiter: Option<u8>,
}

impl Default for TableLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TableLoader {
    pub fn new() -> Self {
        Self { delimiter: None }
    }

    /// Force a delimiter instead of sniffing the header line
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Parse raw bytes into a DataFrame.
    ///
    /// `FileFormat::Unknown` sniffs the payload. Fails with `ParseError` on
    /// empty payloads, malformed structure, or tables without data rows.
    pub fn load(&self, bytes: &[u8], format: FileFormat) -> Result<DataFrame> {
        if bytes.is_empty() {
            return Err(VisualdataError::ParseError("empty payload".to_string()));
        }

        let format = match format {
            FileFormat::Unknown => sniff_format(bytes),
            declared => declared,
        };

        let (headers, rows) = match format {
            FileFormat::Csv => self.parse_delimited(bytes, None)?,
            FileFormat::Tsv => self.parse_delimited(bytes, Some(b'\t'))?,
            FileFormat::Excel => parse_excel(bytes)?,
            FileFormat::Unknown => unreachable!("format sniffed above"),
        };

        if headers.is_empty() {
            return Err(VisualdataError::ParseError("no columns found".to_string()));
        }
        if rows.is_empty() {
            return Err(VisualdataError::ParseError("no data rows found".to_string()));
        }

        build_frame(headers, rows)
    }

    fn parse_delimited(
        &self,
        bytes: &[u8],
        delimiter: Option<u8>,
    ) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let text = decode_text(bytes);
        let delimiter = delimiter
            .or(self.delimiter)
            .unwrap_or_else(|| sniff_delimiter(&text));

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| VisualdataError::ParseError(format!("failed to read header: {e}")))?
            .iter()
            .map(|s| s.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| VisualdataError::ParseError(format!("malformed row: {e}")))?;
            let mut row: Vec<String> = record.iter().map(|s| s.to_string()).collect();
            // Ragged rows are padded or truncated to the header width
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok((headers, rows))
    }
}

/// UTF-8 first, Latin-1 as the fallback
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Pick the delimiter with the most occurrences in the header line
fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or("");
    let candidates = [b',', b';', b'\t', b'|'];
    candidates
        .into_iter()
        .max_by_key(|&d| first_line.matches(d as char).count())
        .filter(|&d| first_line.contains(d as char))
        .unwrap_or(b',')
}

fn parse_excel(bytes: &[u8]) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| VisualdataError::ParseError(format!("failed to open workbook: {e}")))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| VisualdataError::ParseError("workbook has no worksheets".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| VisualdataError::ParseError(format!("failed to read worksheet: {e}")))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = rows_iter
        .next()
        .map(|row| row.iter().map(excel_cell_to_string).collect())
        .unwrap_or_default();

    let rows: Vec<Vec<String>> = rows_iter
        .map(|row| {
            let mut cells: Vec<String> = row.iter().map(excel_cell_to_string).collect();
            cells.resize(headers.len(), String::new());
            cells
        })
        .collect();

    Ok((headers, rows))
}

fn excel_cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{f:.0}")
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{e:?}"),
    }
}

// ---------------------------------------------------------------------------
// Column kind inference
// ---------------------------------------------------------------------------

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

/// Conventional null literals count as missing, not as parse failures
fn is_missing(cell: &str) -> bool {
    if cell.is_empty() {
        return true;
    }
    matches!(
        cell.to_lowercase().as_str(),
        "n/a" | "na" | "null" | "nil" | "none" | "nan" | "-" | "--" | "#n/a"
    )
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.to_lowercase().as_str() {
        "true" | "yes" | "y" => Some(true),
        "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_datetime_ms(cell: &str) -> Option<i64> {
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(cell, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(cell, fmt) {
            return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
        }
    }
    None
}

/// Infer each column's kind from its content and assemble the frame.
///
/// A kind is assigned only when every non-missing cell parses as it
/// (boolean, then integer, then float, then datetime); anything else is
/// categorical text. All-missing columns are categorical.
fn build_frame(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(headers.len());

    for (j, header) in headers.iter().enumerate() {
        let name = if header.is_empty() {
            format!("column_{j}")
        } else {
            header.clone()
        };

        let cells: Vec<&str> = rows.iter().map(|row| row[j].trim()).collect();
        let present: Vec<&str> = cells.iter().copied().filter(|c| !is_missing(c)).collect();

        let column = if present.is_empty() {
            let values: Vec<Option<String>> = vec![None; cells.len()];
            Column::new(name.into(), values)
        } else if present.iter().all(|c| parse_bool(c).is_some()) {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|c| if is_missing(c) { None } else { parse_bool(c) })
                .collect();
            Column::new(name.into(), values)
        } else if present.iter().all(|c| c.parse::<i64>().is_ok()) {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| if is_missing(c) { None } else { c.parse().ok() })
                .collect();
            Column::new(name.into(), values)
        } else if present.iter().all(|c| c.parse::<f64>().is_ok()) {
            let values: Vec<Option<f64>> = cells
                .iter()
                .map(|c| if is_missing(c) { None } else { c.parse().ok() })
                .collect();
            Column::new(name.into(), values)
        } else if present.iter().all(|c| parse_datetime_ms(c).is_some()) {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| if is_missing(c) { None } else { parse_datetime_ms(c) })
                .collect();
            Column::new(name.into(), values)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .map_err(|e| VisualdataError::ParseError(e.to_string()))?
        } else {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|c| {
                    if is_missing(c) {
                        None
                    } else {
                        Some(c.to_string())
                    }
                })
                .collect();
            Column::new(name.into(), values)
        };

        columns.push(column);
    }

    DataFrame::new(columns).map_err(|e| VisualdataError::ParseError(e.to_string()))
}
