//! Tabular data model
//!
//! Tables are polars [`DataFrame`]s restricted to four column kinds:
//! numeric, categorical text, boolean, and datetime. This module provides
//! the kind model plus the cell-level helpers the pipeline stages share:
//! row signatures for duplicate detection, missing-value masks, JSON record
//! serialization, and numeric feature-matrix extraction.

pub mod loader;

pub use loader::{FileFormat, TableLoader};

use crate::error::{Result, VisualdataError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Declared kind of a table column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Boolean,
    Datetime,
}

impl ColumnKind {
    /// Map a polars dtype onto the column-kind model
    pub fn of(dtype: &DataType) -> ColumnKind {
        match dtype {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64 => ColumnKind::Numeric,
            DataType::Boolean => ColumnKind::Boolean,
            DataType::Datetime(_, _) => ColumnKind::Datetime,
            _ => ColumnKind::Categorical,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Numeric)
    }
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
            ColumnKind::Boolean => write!(f, "boolean"),
            ColumnKind::Datetime => write!(f, "datetime"),
        }
    }
}

/// A single materialized cell value. Datetimes carry epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
    Datetime(i64),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Render for display, row signatures, and categorical statistics
    pub fn render(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Float(v) => format!("{v:?}"),
            Cell::Int(v) => v.to_string(),
            Cell::Bool(v) => v.to_string(),
            Cell::Str(v) => v.clone(),
            Cell::Datetime(ms) => render_datetime(*ms),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Null => serde_json::Value::Null,
            Cell::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Cell::Int(v) => serde_json::Value::from(*v),
            Cell::Bool(v) => serde_json::Value::from(*v),
            Cell::Str(v) => serde_json::Value::from(v.clone()),
            Cell::Datetime(ms) => serde_json::Value::from(render_datetime(*ms)),
        }
    }
}

fn render_datetime(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn frame_err(e: PolarsError) -> VisualdataError {
    VisualdataError::ParseError(e.to_string())
}

/// Materialize one column into cells, normalizing integer widths and
/// datetime representation.
pub fn column_cells(col: &Column) -> Result<Vec<Cell>> {
    let series = col.as_materialized_series();
    match series.dtype() {
        DataType::Boolean => {
            let ca = series.bool().map_err(frame_err)?;
            Ok(ca
                .into_iter()
                .map(|v| v.map(Cell::Bool).unwrap_or(Cell::Null))
                .collect())
        }
        DataType::String => {
            let ca = series.str().map_err(frame_err)?;
            Ok(ca
                .into_iter()
                .map(|v| v.map(|s| Cell::Str(s.to_string())).unwrap_or(Cell::Null))
                .collect())
        }
        DataType::Datetime(_, _) => {
            // The physical representation is epoch time; read it through an
            // Int64 cast instead of the logical accessor.
            let s = series.cast(&DataType::Int64).map_err(frame_err)?;
            let ca = s.i64().map_err(frame_err)?;
            Ok(ca
                .into_iter()
                .map(|v| v.map(Cell::Datetime).unwrap_or(Cell::Null))
                .collect())
        }
        DataType::Float32 | DataType::Float64 => {
            let s = series.cast(&DataType::Float64).map_err(frame_err)?;
            let ca = s.f64().map_err(frame_err)?;
            Ok(ca
                .into_iter()
                .map(|v| v.map(Cell::Float).unwrap_or(Cell::Null))
                .collect())
        }
        dt if ColumnKind::of(dt).is_numeric() => {
            let s = series.cast(&DataType::Int64).map_err(frame_err)?;
            let ca = s.i64().map_err(frame_err)?;
            Ok(ca
                .into_iter()
                .map(|v| v.map(Cell::Int).unwrap_or(Cell::Null))
                .collect())
        }
        _ => {
            let s = series.cast(&DataType::String).map_err(frame_err)?;
            let ca = s.str().map_err(frame_err)?;
            Ok(ca
                .into_iter()
                .map(|v| v.map(|x| Cell::Str(x.to_string())).unwrap_or(Cell::Null))
                .collect())
        }
    }
}

/// Materialize the whole frame column-major
pub fn frame_cells(df: &DataFrame) -> Result<Vec<Vec<Cell>>> {
    df.get_columns().iter().map(column_cells).collect()
}

/// One signature string per row; equal signatures mean equal rows.
pub fn row_signatures(df: &DataFrame) -> Result<Vec<String>> {
    let columns = frame_cells(df)?;
    let n_rows = df.height();
    let mut signatures = Vec::with_capacity(n_rows);
    for i in 0..n_rows {
        let mut sig = String::new();
        for cells in &columns {
            match &cells[i] {
                // Nulls must not collide with empty strings
                Cell::Null => sig.push('\u{0}'),
                cell => sig.push_str(&cell.render()),
            }
            sig.push('\u{1f}');
        }
        signatures.push(sig);
    }
    Ok(signatures)
}

/// `true` for every row that duplicates an earlier row across all columns
pub fn duplicate_mask(df: &DataFrame) -> Result<Vec<bool>> {
    let signatures = row_signatures(df)?;
    let mut seen = std::collections::HashSet::with_capacity(signatures.len());
    Ok(signatures.into_iter().map(|sig| !seen.insert(sig)).collect())
}

/// `true` for every row containing at least one missing value
pub fn missing_row_mask(df: &DataFrame) -> Result<Vec<bool>> {
    let columns = frame_cells(df)?;
    let n_rows = df.height();
    let mut mask = vec![false; n_rows];
    for cells in &columns {
        for (i, cell) in cells.iter().enumerate() {
            if cell.is_null() {
                mask[i] = true;
            }
        }
    }
    Ok(mask)
}

/// Keep only the rows where `keep[i]` is true, preserving order
pub fn filter_rows(df: &DataFrame, keep: &[bool]) -> Result<DataFrame> {
    let mask: BooleanChunked = keep.iter().map(|&b| Some(b)).collect();
    df.filter(&mask).map_err(frame_err)
}

/// Serialize every row as an ordered JSON object keyed by column name
pub fn to_records(df: &DataFrame) -> Result<Vec<serde_json::Map<String, serde_json::Value>>> {
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let columns = frame_cells(df)?;
    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut record = serde_json::Map::with_capacity(names.len());
        for (name, cells) in names.iter().zip(columns.iter()) {
            record.insert(name.clone(), cells[i].to_json());
        }
        records.push(record);
    }
    Ok(records)
}

/// Names of all numeric columns, in frame order
pub fn numeric_column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| ColumnKind::of(c.dtype()).is_numeric())
        .map(|c| c.name().to_string())
        .collect()
}

/// Extract the numeric feature matrix as one `Vec<f64>` per row.
///
/// `exclude` removes one column from the feature set. Missing or non-finite
/// cells are rejected; callers drop incomplete rows first.
pub fn numeric_matrix(df: &DataFrame, exclude: Option<&str>) -> Result<(Vec<String>, Vec<Vec<f64>>)> {
    let names: Vec<String> = numeric_column_names(df)
        .into_iter()
        .filter(|n| Some(n.as_str()) != exclude)
        .collect();

    let mut feature_columns = Vec::with_capacity(names.len());
    for name in &names {
        let col = df
            .column(name)
            .map_err(|e| VisualdataError::ReductionError(e.to_string()))?;
        let s = col
            .as_materialized_series()
            .cast(&DataType::Float64)
            .map_err(|e| VisualdataError::ReductionError(e.to_string()))?;
        let ca = s
            .f64()
            .map_err(|e| VisualdataError::ReductionError(e.to_string()))?;
        let mut values = Vec::with_capacity(df.height());
        for v in ca.into_iter() {
            match v {
                Some(x) if x.is_finite() => values.push(x),
                Some(_) => {
                    return Err(VisualdataError::ReductionError(format!(
                        "column '{name}' contains non-finite values"
                    )))
                }
                None => {
                    return Err(VisualdataError::ReductionError(format!(
                        "column '{name}' contains missing values"
                    )))
                }
            }
        }
        feature_columns.push(values);
    }

    let n_rows = df.height();
    let mut rows = Vec::with_capacity(n_rows);
    for i in 0..n_rows {
        rows.push(feature_columns.iter().map(|col| col[i]).collect());
    }
    Ok((names, rows))
}
