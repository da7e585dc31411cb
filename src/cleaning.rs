//! Cleaning engine
//!
//! Applies duplicate removal and missing-value handling to a table under a
//! [`CleaningConfig`], producing a new frame plus a report of affected rows
//! and cells. The input frame is never mutated. Operation order is fixed:
//! duplicates first, then missing values (drop, or imputation when not
//! dropping).
//!
//! Mean and median imputation are numeric-only; a non-numeric column with
//! missing values is left unmodified rather than erroring.

use crate::error::{Result, VisualdataError};
use crate::table::{self, ColumnKind};
use crate::utils::math;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Imputation strategy for missing values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImputeStrategy {
    /// Column mean (numeric columns only)
    Mean,
    /// Column median (numeric columns only)
    Median,
    /// Fixed sentinel: 0 for numeric, "0" for text, false for boolean
    Fill,
}

/// Cleaning policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Remove rows containing at least one missing value
    pub drop_missing: bool,
    /// Remove rows that duplicate an earlier row, keeping the first
    pub drop_duplicates: bool,
    /// Applied only when `drop_missing` is false
    pub impute: Option<ImputeStrategy>,
}

/// Counts of rows and cells affected by a cleaning pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    pub duplicates_removed: usize,
    pub rows_dropped: usize,
    pub cells_imputed: usize,
}

/// Stateless cleaning engine
pub struct DataCleaner {
    config: CleaningConfig,
}

impl DataCleaner {
    pub fn new(config: CleaningConfig) -> Self {
        Self { config }
    }

    /// Produce a cleaned copy of the frame plus the affected counts
    pub fn clean(&self, df: &DataFrame) -> Result<(DataFrame, CleaningReport)> {
        let mut report = CleaningReport::default();
        let mut frame = df.clone();

        if self.config.drop_duplicates {
            let (deduped, removed) = drop_duplicate_rows(&frame)?;
            frame = deduped;
            report.duplicates_removed = removed;
        }

        if self.config.drop_missing {
            let (kept, dropped) = drop_missing_rows(&frame)?;
            frame = kept;
            report.rows_dropped = dropped;
        } else if let Some(strategy) = self.config.impute {
            let (imputed, cells) = impute_missing(&frame, strategy)?;
            frame = imputed;
            report.cells_imputed = cells;
        }

        Ok((frame, report))
    }
}

/// Remove rows duplicating an earlier row; first occurrence survives
pub fn drop_duplicate_rows(df: &DataFrame) -> Result<(DataFrame, usize)> {
    let mask = table::duplicate_mask(df)?;
    let removed = mask.iter().filter(|&&d| d).count();
    if removed == 0 {
        return Ok((df.clone(), 0));
    }
    let keep: Vec<bool> = mask.iter().map(|&d| !d).collect();
    Ok((table::filter_rows(df, &keep)?, removed))
}

/// Remove every row containing at least one missing value
pub fn drop_missing_rows(df: &DataFrame) -> Result<(DataFrame, usize)> {
    let mask = table::missing_row_mask(df)?;
    let dropped = mask.iter().filter(|&&m| m).count();
    if dropped == 0 {
        return Ok((df.clone(), 0));
    }
    let keep: Vec<bool> = mask.iter().map(|&m| !m).collect();
    Ok((table::filter_rows(df, &keep)?, dropped))
}

fn impute_missing(df: &DataFrame, strategy: ImputeStrategy) -> Result<(DataFrame, usize)> {
    let mut result = df.clone();
    let mut cells_imputed = 0usize;

    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    for name in &names {
        let col = result
            .column(name)
            .map_err(|e| VisualdataError::CleaningError(e.to_string()))?;
        let nulls = col.null_count();
        if nulls == 0 {
            continue;
        }

        let kind = ColumnKind::of(col.dtype());
        let filled = match (strategy, kind) {
            (ImputeStrategy::Mean, ColumnKind::Numeric) => {
                Some(fill_numeric(col, NumericFill::Mean)?)
            }
            (ImputeStrategy::Median, ColumnKind::Numeric) => {
                Some(fill_numeric(col, NumericFill::Median)?)
            }
            (ImputeStrategy::Fill, ColumnKind::Numeric) => {
                Some(fill_numeric(col, NumericFill::Constant(0.0))?)
            }
            (ImputeStrategy::Fill, ColumnKind::Categorical) => Some(fill_text(col, "0")?),
            (ImputeStrategy::Fill, ColumnKind::Boolean) => Some(fill_bool(col, false)?),
            // Mean/median need numeric semantics; datetimes have no sentinel
            _ => None,
        };

        if let Some(series) = filled {
            result = result
                .with_column(series)
                .map_err(|e| VisualdataError::CleaningError(e.to_string()))?
                .clone();
            cells_imputed += nulls;
        }
    }

    Ok((result, cells_imputed))
}

enum NumericFill {
    Mean,
    Median,
    Constant(f64),
}

fn fill_numeric(col: &Column, fill: NumericFill) -> Result<Series> {
    let s = col
        .as_materialized_series()
        .cast(&DataType::Float64)
        .map_err(|e| VisualdataError::CleaningError(e.to_string()))?;
    let ca = s
        .f64()
        .map_err(|e| VisualdataError::CleaningError(e.to_string()))?;

    let value = match fill {
        NumericFill::Constant(v) => v,
        NumericFill::Mean => {
            let present: Vec<f64> = ca.into_iter().flatten().collect();
            math::mean(&present)
        }
        NumericFill::Median => {
            let mut present: Vec<f64> = ca.into_iter().flatten().collect();
            present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            math::percentile_linear(&present, 0.5)
        }
    };

    let filled: Float64Chunked = ca
        .into_iter()
        .map(|opt| Some(opt.unwrap_or(value)))
        .collect();
    Ok(filled.with_name(s.name().clone()).into_series())
}

fn fill_text(col: &Column, value: &str) -> Result<Series> {
    let series = col.as_materialized_series();
    let ca = series
        .str()
        .map_err(|e| VisualdataError::CleaningError(e.to_string()))?;
    let filled: StringChunked = ca
        .into_iter()
        .map(|opt| Some(opt.unwrap_or(value).to_string()))
        .collect();
    Ok(filled.with_name(series.name().clone()).into_series())
}

fn fill_bool(col: &Column, value: bool) -> Result<Series> {
    let series = col.as_materialized_series();
    let ca = series
        .bool()
        .map_err(|e| VisualdataError::CleaningError(e.to_string()))?;
    let filled: BooleanChunked = ca
        .into_iter()
        .map(|opt| Some(opt.unwrap_or(value)))
        .collect();
    Ok(filled.with_name(series.name().clone()).into_series())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let df = df!(
            "a" => &[1i64, 2, 1, 3],
            "b" => &["x", "y", "x", "z"]
        )
        .unwrap();

        let cleaner = DataCleaner::new(CleaningConfig {
            drop_duplicates: true,
            ..Default::default()
        });
        let (cleaned, report) = cleaner.clean(&df).unwrap();
        assert_eq!(cleaned.height(), 3);
        assert_eq!(report.duplicates_removed, 1);

        // Order preserved: 1, 2, 3
        let s = cleaned.column("a").unwrap().as_materialized_series().clone();
        let values: Vec<i64> = s.i64().unwrap().into_iter().flatten().collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let df = df!(
            "a" => &[1i64, 1, 2, 2, 2]
        )
        .unwrap();

        let (once, _) = drop_duplicate_rows(&df).unwrap();
        let (twice, removed) = drop_duplicate_rows(&once).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(once.height(), twice.height());
    }

    #[test]
    fn test_drop_missing_leaves_no_nulls() {
        let df = df!(
            "a" => &[Some(1.0), None, Some(3.0)],
            "b" => &[Some("x"), Some("y"), None]
        )
        .unwrap();

        let cleaner = DataCleaner::new(CleaningConfig {
            drop_missing: true,
            ..Default::default()
        });
        let (cleaned, report) = cleaner.clean(&df).unwrap();
        assert_eq!(cleaned.height(), 1);
        assert_eq!(report.rows_dropped, 2);
        for col in cleaned.get_columns() {
            assert_eq!(col.null_count(), 0);
        }
    }

    #[test]
    fn test_mean_imputation() {
        let df = df!(
            "v" => &[Some(1.0), None, Some(3.0), Some(4.0)]
        )
        .unwrap();

        let cleaner = DataCleaner::new(CleaningConfig {
            impute: Some(ImputeStrategy::Mean),
            ..Default::default()
        });
        let (cleaned, report) = cleaner.clean(&df).unwrap();
        assert_eq!(report.cells_imputed, 1);

        let s = cleaned.column("v").unwrap().as_materialized_series().clone();
        let ca = s.f64().unwrap();
        assert!((ca.get(1).unwrap() - 8.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_median_imputation_interpolates() {
        let df = df!(
            "v" => &[Some(1.0), Some(2.0), Some(10.0), Some(20.0), None]
        )
        .unwrap();

        let cleaner = DataCleaner::new(CleaningConfig {
            impute: Some(ImputeStrategy::Median),
            ..Default::default()
        });
        let (cleaned, _) = cleaner.clean(&df).unwrap();
        let s = cleaned.column("v").unwrap().as_materialized_series().clone();
        let ca = s.f64().unwrap();
        assert!((ca.get(4).unwrap() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_impute_skips_text_column() {
        let df = df!(
            "v" => &[Some(1.0), None],
            "c" => &[Some("x"), None]
        )
        .unwrap();

        let cleaner = DataCleaner::new(CleaningConfig {
            impute: Some(ImputeStrategy::Mean),
            ..Default::default()
        });
        let (cleaned, report) = cleaner.clean(&df).unwrap();
        // The numeric column is filled; the text column is left untouched
        assert_eq!(report.cells_imputed, 1);
        assert_eq!(cleaned.column("v").unwrap().null_count(), 0);
        assert_eq!(cleaned.column("c").unwrap().null_count(), 1);
    }

    #[test]
    fn test_fill_sentinels_per_kind() {
        let df = df!(
            "n" => &[Some(5.0), None],
            "t" => &[Some("a"), None],
            "b" => &[Some(true), None]
        )
        .unwrap();

        let cleaner = DataCleaner::new(CleaningConfig {
            impute: Some(ImputeStrategy::Fill),
            ..Default::default()
        });
        let (cleaned, report) = cleaner.clean(&df).unwrap();
        assert_eq!(report.cells_imputed, 3);

        let n = cleaned.column("n").unwrap().as_materialized_series().clone();
        assert_eq!(n.f64().unwrap().get(1), Some(0.0));
        let t = cleaned.column("t").unwrap().as_materialized_series().clone();
        assert_eq!(t.str().unwrap().get(1), Some("0"));
        let b = cleaned.column("b").unwrap().as_materialized_series().clone();
        assert_eq!(b.bool().unwrap().get(1), Some(false));
    }

    #[test]
    fn test_drop_missing_takes_precedence_over_impute() {
        let df = df!(
            "v" => &[Some(1.0), None, Some(3.0)]
        )
        .unwrap();

        let cleaner = DataCleaner::new(CleaningConfig {
            drop_missing: true,
            impute: Some(ImputeStrategy::Mean),
            ..Default::default()
        });
        let (cleaned, report) = cleaner.clean(&df).unwrap();
        assert_eq!(cleaned.height(), 2);
        assert_eq!(report.rows_dropped, 1);
        assert_eq!(report.cells_imputed, 0);
    }

    #[test]
    fn test_input_frame_not_mutated() {
        let df = df!(
            "v" => &[Some(1.0), None, Some(1.0)]
        )
        .unwrap();

        let cleaner = DataCleaner::new(CleaningConfig {
            drop_missing: true,
            drop_duplicates: true,
            ..Default::default()
        });
        let _ = cleaner.clean(&df).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.column("v").unwrap().null_count(), 1);
    }
}
