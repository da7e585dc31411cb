//! Dataset profiler
//!
//! Computes a read-only structural and statistical profile of a table:
//! shape, per-column kind and missing counts, duplicate-row count, and
//! descriptive statistics. Deterministic and side-effect free.

use crate::error::Result;
use crate::table::{self, Cell, ColumnKind};
use crate::utils::math;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

/// Descriptive statistics for a numeric column.
///
/// Percentiles use linear interpolation between order statistics; std is the
/// unbiased sample definition. Fields are `None` when undefined (empty
/// column, or fewer than 2 values for std).
#[derive(Debug, Clone, Serialize)]
pub struct NumericStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub q25: Option<f64>,
    #[serde(rename = "50%")]
    pub median: Option<f64>,
    #[serde(rename = "75%")]
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

/// Descriptive statistics for a categorical column. Ties for the most
/// frequent value break toward the first-encountered value in column order.
#[derive(Debug, Clone, Serialize)]
pub struct CategoricalStats {
    pub count: usize,
    pub unique: usize,
    pub top: Option<String>,
    pub freq: usize,
}

/// Statistics for one column, by kind
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ColumnStats {
    Numeric(NumericStats),
    Categorical(CategoricalStats),
}

/// Profile of one column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub missing: usize,
    pub stats: ColumnStats,
}

/// Read-only profile of a table
#[derive(Debug, Clone, Serialize)]
pub struct DatasetProfile {
    /// (rows, columns)
    pub shape: (usize, usize),
    pub columns: Vec<ColumnProfile>,
    /// Rows equal to an earlier row across all columns
    pub duplicate_rows: usize,
}

/// Profile a table without mutating it
pub fn profile(df: &DataFrame) -> Result<DatasetProfile> {
    let duplicate_rows = table::duplicate_mask(df)?.iter().filter(|&&d| d).count();

    let mut columns = Vec::with_capacity(df.width());
    for col in df.get_columns() {
        let kind = ColumnKind::of(col.dtype());
        let cells = table::column_cells(col)?;
        let missing = cells.iter().filter(|c| c.is_null()).count();

        let stats = if kind.is_numeric() {
            ColumnStats::Numeric(numeric_stats(&cells))
        } else {
            ColumnStats::Categorical(categorical_stats(&cells))
        };

        columns.push(ColumnProfile {
            name: col.name().to_string(),
            kind,
            missing,
            stats,
        });
    }

    Ok(DatasetProfile {
        shape: (df.height(), df.width()),
        columns,
        duplicate_rows,
    })
}

fn numeric_stats(cells: &[Cell]) -> NumericStats {
    let mut values: Vec<f64> = cells
        .iter()
        .filter_map(|c| match c {
            Cell::Float(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            _ => None,
        })
        .collect();

    let count = values.len();
    if count == 0 {
        return NumericStats {
            count,
            mean: None,
            std: None,
            min: None,
            q25: None,
            median: None,
            q75: None,
            max: None,
        };
    }

    let mean = math::mean(&values);
    let std = if count >= 2 {
        Some(math::sample_std(&values))
    } else {
        None
    };

    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    NumericStats {
        count,
        mean: Some(mean),
        std,
        min: Some(values[0]),
        q25: Some(math::percentile_linear(&values, 0.25)),
        median: Some(math::percentile_linear(&values, 0.50)),
        q75: Some(math::percentile_linear(&values, 0.75)),
        max: Some(values[count - 1]),
    }
}

fn categorical_stats(cells: &[Cell]) -> CategoricalStats {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new(); // value -> (count, first index)
    let mut count = 0usize;

    for (i, cell) in cells.iter().enumerate() {
        if cell.is_null() {
            continue;
        }
        count += 1;
        let entry = counts.entry(cell.render()).or_insert((0, i));
        entry.0 += 1;
    }

    let unique = counts.len();
    let top_entry = counts
        .into_iter()
        .max_by(|(_, (ca, ia)), (_, (cb, ib))| ca.cmp(cb).then(ib.cmp(ia)));

    match top_entry {
        Some((value, (freq, _))) => CategoricalStats {
            count,
            unique,
            top: Some(value),
            freq,
        },
        None => CategoricalStats {
            count,
            unique,
            top: None,
            freq: 0,
        },
    }
}
