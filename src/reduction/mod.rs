//! Reduction orchestrator
//!
//! Validates a [`ReductionRequest`] against a table, selects the reduction
//! method (resolving `auto` through [`AutoSelector`]), extracts the numeric
//! feature matrix, and produces a 2D or 3D [`Embedding`] with per-row color
//! values attached when requested.
//!
//! Rows containing missing values are dropped before feature extraction, so
//! the embedding is aligned with the surviving rows in their original order.

pub mod auto;
pub mod pca;
pub mod tsne;
pub mod umap;

pub use auto::AutoSelector;
pub use pca::{Pca, PcaConfig, PcaResult};
pub use tsne::{Tsne, TsneConfig};
pub use umap::{Umap, UmapConfig};

use crate::cleaning;
use crate::error::{Result, VisualdataError};
use crate::table::{self, Cell, ColumnKind};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::time::Duration;
use tracing::info;

/// Default t-SNE perplexity
pub const DEFAULT_PERPLEXITY: f64 = 5.0;
/// Default UMAP neighborhood size
pub const DEFAULT_N_NEIGHBORS: usize = 10;
/// Default UMAP minimum embedding distance
pub const DEFAULT_MIN_DIST: f64 = 0.1;
/// Default random seed shared by the seeded methods
pub const DEFAULT_RANDOM_STATE: u64 = 42;

/// Reduction method, or `auto` to let the selector decide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReductionMethod {
    Pca,
    Tsne,
    Umap,
    Auto,
}

impl std::fmt::Display for ReductionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReductionMethod::Pca => write!(f, "pca"),
            ReductionMethod::Tsne => write!(f, "tsne"),
            ReductionMethod::Umap => write!(f, "umap"),
            ReductionMethod::Auto => write!(f, "auto"),
        }
    }
}

/// A validated reduction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReductionRequest {
    pub method: ReductionMethod,
    /// 2 or 3
    pub n_components: usize,
    /// Column whose values color the points; excluded from the feature set
    pub color_column: Option<String>,
    pub title: String,
    pub perplexity: f64,
    pub n_neighbors: usize,
    pub min_dist: f64,
    pub random_state: u64,
    /// Wall-clock bound on the embedding computation
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl Default for ReductionRequest {
    fn default() -> Self {
        Self {
            method: ReductionMethod::Auto,
            n_components: 2,
            color_column: None,
            title: "Interactive visualization".to_string(),
            perplexity: DEFAULT_PERPLEXITY,
            n_neighbors: DEFAULT_N_NEIGHBORS,
            min_dist: DEFAULT_MIN_DIST,
            random_state: DEFAULT_RANDOM_STATE,
            timeout: None,
        }
    }
}

/// Color values resolved per surviving row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColorValues {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl ColorValues {
    pub fn len(&self) -> usize {
        match self {
            ColorValues::Numeric(v) => v.len(),
            ColorValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Low-dimensional coordinates, one row per surviving input row
#[derive(Debug, Clone, Serialize)]
pub struct Embedding {
    pub points: Vec<Vec<f64>>,
    /// One label per output dimension (PC_1, TSNE_2, ...)
    pub axis_labels: Vec<String>,
    pub color_column: Option<String>,
    pub color: Option<ColorValues>,
}

/// Result of a reduction, including the concrete method that ran
#[derive(Debug, Clone, Serialize)]
pub struct ReductionOutcome {
    pub embedding: Embedding,
    pub method_used: ReductionMethod,
    /// Rows removed before reduction because they contained missing values
    pub rows_dropped: usize,
}

/// Run the full reduction pipeline over a table
pub fn reduce(df: &DataFrame, request: &ReductionRequest) -> Result<ReductionOutcome> {
    if request.n_components != 2 && request.n_components != 3 {
        return Err(VisualdataError::ReductionError(format!(
            "target dimension must be 2 or 3, got {}",
            request.n_components
        )));
    }

    if let Some(color) = &request.color_column {
        if df.column(color).is_err() {
            return Err(VisualdataError::ReductionError(format!(
                "color column '{color}' not found"
            )));
        }
    }

    let (cleaned, rows_dropped) = cleaning::drop_missing_rows(df)?;
    if cleaned.height() == 0 {
        return Err(VisualdataError::ReductionError(
            "no rows left after dropping missing values".to_string(),
        ));
    }

    let (_, features) = table::numeric_matrix(&cleaned, request.color_column.as_deref())?;
    let n_rows = cleaned.height();
    let n_features = features.first().map(|r| r.len()).unwrap_or(0);
    if n_features == 0 {
        return Err(VisualdataError::ReductionError(
            "no numeric feature columns available".to_string(),
        ));
    }

    let method = match request.method {
        ReductionMethod::Auto => AutoSelector::select(n_rows, n_features),
        concrete => concrete,
    };

    validate_parameters(method, request, n_rows, n_features)?;

    info!(
        method = %method,
        rows = n_rows,
        features = n_features,
        dims = request.n_components,
        "running reduction"
    );

    let points = compute_embedding(method, request, features)?;
    let axis_labels = axis_labels(method, request.n_components);
    let (color_column, color) = match &request.color_column {
        Some(name) => (Some(name.clone()), Some(color_values(&cleaned, name)?)),
        None => (None, None),
    };

    Ok(ReductionOutcome {
        embedding: Embedding {
            points,
            axis_labels,
            color_column,
            color,
        },
        method_used: method,
        rows_dropped,
    })
}

fn validate_parameters(
    method: ReductionMethod,
    request: &ReductionRequest,
    n_rows: usize,
    n_features: usize,
) -> Result<()> {
    match method {
        ReductionMethod::Pca if n_features < request.n_components => {
            return Err(VisualdataError::ReductionError(format!(
                "PCA needs at least {} feature columns for a {}D projection, got {}",
                request.n_components, request.n_components, n_features
            )));
        }
        ReductionMethod::Tsne => {
            if request.perplexity >= n_rows as f64 {
                return Err(VisualdataError::ReductionError(format!(
                    "perplexity {} must be smaller than the row count {}",
                    request.perplexity, n_rows
                )));
            }
        }
        ReductionMethod::Umap => {
            if request.n_neighbors >= n_rows {
                return Err(VisualdataError::ReductionError(format!(
                    "n_neighbors {} must be smaller than the row count {}",
                    request.n_neighbors, n_rows
                )));
            }
            if request.min_dist < 0.0 {
                return Err(VisualdataError::ReductionError(
                    "min_dist must be non-negative".to_string(),
                ));
            }
        }
        ReductionMethod::Pca | ReductionMethod::Auto => {}
    }
    Ok(())
}

fn compute_embedding(
    method: ReductionMethod,
    request: &ReductionRequest,
    features: Vec<Vec<f64>>,
) -> Result<Vec<Vec<f64>>> {
    let n_components = request.n_components;
    let random_state = request.random_state;

    match method {
        ReductionMethod::Pca => {
            let pca = Pca::new(PcaConfig {
                n_components,
                random_state,
                ..Default::default()
            });
            // PCA is cheap and deterministic; no timeout needed
            Ok(pca.fit_transform(&features)?.embedding)
        }
        ReductionMethod::Tsne => {
            let config = TsneConfig {
                n_components,
                perplexity: request.perplexity,
                random_state,
                ..Default::default()
            };
            run_with_timeout(request.timeout, move || {
                Tsne::new(config).fit_transform(&features)
            })
        }
        ReductionMethod::Umap => {
            let config = UmapConfig {
                n_components,
                n_neighbors: request.n_neighbors,
                min_dist: request.min_dist,
                random_state,
                ..Default::default()
            };
            run_with_timeout(request.timeout, move || {
                Umap::new(config).fit_transform(&features)
            })
        }
        ReductionMethod::Auto => unreachable!("auto is resolved before dispatch"),
    }
}

/// Run a computation, bounding it by a wall-clock timeout when configured.
/// The worker thread is detached on timeout; its result is discarded.
fn run_with_timeout<F>(timeout: Option<Duration>, job: F) -> Result<Vec<Vec<f64>>>
where
    F: FnOnce() -> Result<Vec<Vec<f64>>> + Send + 'static,
{
    let Some(limit) = timeout else {
        return job();
    };

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(job());
    });

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(_) => Err(VisualdataError::ReductionError(format!(
            "reduction did not complete within {limit:?}"
        ))),
    }
}

fn axis_labels(method: ReductionMethod, n_components: usize) -> Vec<String> {
    let prefix = match method {
        ReductionMethod::Pca => "PC",
        ReductionMethod::Tsne => "TSNE",
        ReductionMethod::Umap => "UMAP",
        ReductionMethod::Auto => "DIM",
    };
    (1..=n_components).map(|i| format!("{prefix}_{i}")).collect()
}

/// Resolve the color column of the cleaned frame into per-row values
fn color_values(df: &DataFrame, name: &str) -> Result<ColorValues> {
    let col = df
        .column(name)
        .map_err(|e| VisualdataError::ReductionError(e.to_string()))?;
    let cells = table::column_cells(col)?;

    if ColumnKind::of(col.dtype()).is_numeric() {
        let values = cells
            .iter()
            .map(|c| match c {
                Cell::Float(v) => *v,
                Cell::Int(v) => *v as f64,
                _ => f64::NAN,
            })
            .collect();
        Ok(ColorValues::Numeric(values))
    } else {
        Ok(ColorValues::Text(cells.iter().map(|c| c.render()).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn numeric_frame(rows: usize) -> DataFrame {
        let a: Vec<f64> = (0..rows).map(|i| i as f64 * 0.5).collect();
        let b: Vec<f64> = (0..rows).map(|i| (i as f64 * 0.3).sin()).collect();
        let c: Vec<f64> = (0..rows).map(|i| (i as f64 * 0.7).cos()).collect();
        let d: Vec<f64> = (0..rows).map(|i| (i % 7) as f64).collect();
        df!("a" => &a, "b" => &b, "c" => &c, "d" => &d).unwrap()
    }

    #[test]
    fn test_reduce_rejects_bad_dims() {
        let df = numeric_frame(10);
        let request = ReductionRequest {
            n_components: 4,
            ..Default::default()
        };
        assert!(matches!(
            reduce(&df, &request).unwrap_err(),
            VisualdataError::ReductionError(_)
        ));
    }

    #[test]
    fn test_reduce_rejects_unknown_color_column() {
        let df = numeric_frame(10);
        let request = ReductionRequest {
            color_column: Some("ghost".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            reduce(&df, &request).unwrap_err(),
            VisualdataError::ReductionError(_)
        ));
    }

    #[test]
    fn test_reduce_pca_preserves_row_count_and_order() {
        let df = numeric_frame(30);
        let request = ReductionRequest {
            method: ReductionMethod::Pca,
            ..Default::default()
        };
        let outcome = reduce(&df, &request).unwrap();
        assert_eq!(outcome.method_used, ReductionMethod::Pca);
        assert_eq!(outcome.embedding.points.len(), 30);
        assert!(outcome.embedding.points.iter().all(|p| p.len() == 2));
        assert_eq!(outcome.embedding.axis_labels, vec!["PC_1", "PC_2"]);
    }

    #[test]
    fn test_reduce_drops_missing_rows_first() {
        let df = df!(
            "x" => &[Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)],
            "y" => &[Some(2.0), Some(9.0), Some(6.0), Some(8.0), Some(10.0)]
        )
        .unwrap();

        let request = ReductionRequest {
            method: ReductionMethod::Pca,
            ..Default::default()
        };
        let outcome = reduce(&df, &request).unwrap();
        assert_eq!(outcome.rows_dropped, 1);
        assert_eq!(outcome.embedding.points.len(), 4);
    }

    #[test]
    fn test_reduce_rejects_table_without_numeric_columns() {
        let df = df!(
            "c" => &["a", "b", "c"]
        )
        .unwrap();
        assert!(matches!(
            reduce(&df, &ReductionRequest::default()).unwrap_err(),
            VisualdataError::ReductionError(_)
        ));
    }

    #[test]
    fn test_reduce_excludes_numeric_color_column_from_features() {
        let df = df!(
            "x" => &[1.0, 2.0, 3.0, 4.0],
            "y" => &[2.0, 4.0, 6.0, 8.0],
            "label" => &[0i64, 0, 1, 1]
        )
        .unwrap();

        let request = ReductionRequest {
            method: ReductionMethod::Pca,
            color_column: Some("label".to_string()),
            ..Default::default()
        };
        let outcome = reduce(&df, &request).unwrap();
        assert_eq!(
            outcome.embedding.color,
            Some(ColorValues::Numeric(vec![0.0, 0.0, 1.0, 1.0]))
        );
    }

    #[test]
    fn test_reduce_pca_needs_enough_features() {
        let df = df!(
            "x" => &[1.0, 2.0, 3.0, 4.0],
            "y" => &[4.0, 3.0, 2.0, 1.0]
        )
        .unwrap();
        let request = ReductionRequest {
            method: ReductionMethod::Pca,
            n_components: 3,
            ..Default::default()
        };
        assert!(reduce(&df, &request).is_err());
    }

    #[test]
    fn test_reduce_tsne_perplexity_validated_against_rows() {
        let df = numeric_frame(50);
        let request = ReductionRequest {
            method: ReductionMethod::Tsne,
            perplexity: 200.0,
            ..Default::default()
        };
        let err = reduce(&df, &request).unwrap_err();
        assert!(matches!(err, VisualdataError::ReductionError(_)));
    }

    #[test]
    fn test_reduce_umap_neighbors_validated_against_rows() {
        let df = numeric_frame(8);
        let request = ReductionRequest {
            method: ReductionMethod::Umap,
            n_neighbors: 8,
            ..Default::default()
        };
        assert!(reduce(&df, &request).is_err());
    }

    #[test]
    fn test_reduce_timeout_fires() {
        let df = numeric_frame(600);
        let request = ReductionRequest {
            method: ReductionMethod::Tsne,
            timeout: Some(Duration::from_millis(1)),
            ..Default::default()
        };
        let err = reduce(&df, &request).unwrap_err();
        match err {
            VisualdataError::ReductionError(msg) => assert!(msg.contains("did not complete")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_text_color_values_attached() {
        let df = df!(
            "x" => &[1.0, 2.0, 3.0, 4.0],
            "y" => &[4.0, 3.0, 2.0, 1.0],
            "group" => &["a", "b", "a", "b"]
        )
        .unwrap();

        let request = ReductionRequest {
            method: ReductionMethod::Pca,
            color_column: Some("group".to_string()),
            ..Default::default()
        };
        let outcome = reduce(&df, &request).unwrap();
        assert_eq!(
            outcome.embedding.color,
            Some(ColorValues::Text(vec![
                "a".to_string(),
                "b".to_string(),
                "a".to_string(),
                "b".to_string()
            ]))
        );
    }
}
