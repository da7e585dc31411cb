//! Automatic reduction method selection
//!
//! Picks a method from the shape of the feature matrix: linear projection
//! for small or already low-dimensional data, the neighbor-graph method for
//! moderate sizes where local cluster structure matters, and the manifold
//! method for large or high-dimensional data.

use super::ReductionMethod;
use tracing::info;

/// Below this row count a fast deterministic projection suffices
pub const SMALL_ROWS: usize = 100;
/// At or below this feature count the data is close to plottable already
pub const LOW_DIM_FEATURES: usize = 3;
/// Above this feature count (with enough rows) manifold structure dominates
pub const HIGH_DIM_FEATURES: usize = 50;
/// Largest dataset the quadratic neighbor-graph method is worth
pub const TSNE_MAX_ROWS: usize = 2000;

/// Method selector for `auto` requests
pub struct AutoSelector;

impl AutoSelector {
    /// Resolve a concrete method from the feature matrix shape
    pub fn select(n_rows: usize, n_features: usize) -> ReductionMethod {
        let method = if n_features <= LOW_DIM_FEATURES || n_rows < SMALL_ROWS {
            ReductionMethod::Pca
        } else if n_rows > SMALL_ROWS && n_features > HIGH_DIM_FEATURES {
            ReductionMethod::Umap
        } else if n_rows <= TSNE_MAX_ROWS {
            ReductionMethod::Tsne
        } else {
            ReductionMethod::Umap
        };

        info!(
            rows = n_rows,
            features = n_features,
            method = %method,
            "auto selector resolved reduction method"
        );
        method
    }
}
