//! PCA — principal component analysis
//!
//! Linear projection onto the directions of maximal variance. The top-k
//! eigenvectors of the covariance matrix are extracted with power iteration
//! and deflation, which is plenty for the 2–3 components a scatter plot
//! needs. Fully deterministic for a fixed seed.

use crate::error::{Result, VisualdataError};
use crate::utils::math;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// PCA configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaConfig {
    /// Number of output dimensions
    pub n_components: usize,
    /// Subtract the per-feature mean
    pub center: bool,
    /// Scale features to unit variance
    pub scale: bool,
    /// Seed for power-iteration initialization
    pub random_state: u64,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            center: true,
            scale: true,
            random_state: 42,
        }
    }
}

/// Projection result with explained variance per component
#[derive(Debug, Clone, Serialize)]
pub struct PcaResult {
    /// n_samples rows of n_components coordinates
    pub embedding: Vec<Vec<f64>>,
    pub explained_variance_ratio: Vec<f64>,
    pub eigenvalues: Vec<f64>,
}

pub struct Pca {
    config: PcaConfig,
}

impl Pca {
    pub fn new(config: PcaConfig) -> Self {
        Self { config }
    }

    /// Project dense row-major data onto the top components
    pub fn fit_transform(&self, data: &[Vec<f64>]) -> Result<PcaResult> {
        let n = data.len();
        if n < 2 {
            return Err(VisualdataError::ReductionError(
                "PCA requires at least 2 samples".to_string(),
            ));
        }
        let d = data[0].len();
        if d < 1 {
            return Err(VisualdataError::ReductionError(
                "PCA requires at least 1 feature".to_string(),
            ));
        }

        let k = self.config.n_components.min(d).min(n);

        let standardized = self.standardize(data, d);
        let cov = covariance(&standardized, d);
        let (eigenvalues, eigenvectors) = self.power_iteration(&cov, d, k);

        // Ratio against the full variance on the covariance diagonal
        let full_variance: f64 = (0..d).map(|i| cov[i * d + i]).sum::<f64>().max(1e-12);
        let explained_variance_ratio: Vec<f64> = eigenvalues
            .iter()
            .map(|&ev| (ev / full_variance).max(0.0))
            .collect();

        let embedding: Vec<Vec<f64>> = standardized
            .par_iter()
            .map(|sample| {
                eigenvectors
                    .iter()
                    .map(|component| math::dot(sample, component))
                    .collect()
            })
            .collect();

        Ok(PcaResult {
            embedding,
            explained_variance_ratio,
            eigenvalues,
        })
    }

    /// Center and optionally scale each feature
    fn standardize(&self, data: &[Vec<f64>], d: usize) -> Vec<Vec<f64>> {
        if !self.config.center && !self.config.scale {
            return data.to_vec();
        }

        let columns: Vec<Vec<f64>> = (0..d)
            .map(|j| data.iter().map(|row| row[j]).collect())
            .collect();
        let means: Vec<f64> = columns.iter().map(|col| math::mean(col)).collect();
        let stds: Vec<f64> = if self.config.scale {
            columns
                .iter()
                .map(|col| math::sample_std(col).max(1e-12))
                .collect()
        } else {
            vec![1.0; d]
        };

        data.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, &v)| {
                        let centered = if self.config.center { v - means[j] } else { v };
                        centered / stds[j]
                    })
                    .collect()
            })
            .collect()
    }

    /// Top-k eigenpairs via power iteration with deflation
    fn power_iteration(&self, cov: &[f64], d: usize, k: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
        let max_iter = 300;
        let tol = 1e-10;

        let mut eigenvalues = Vec::with_capacity(k);
        let mut eigenvectors: Vec<Vec<f64>> = Vec::with_capacity(k);
        let mut work = cov.to_vec();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_state);

        for _component in 0..k {
            let mut v: Vec<f64> = (0..d).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let norm = math::dot(&v, &v).sqrt().max(1e-12);
            v.iter_mut().for_each(|x| *x /= norm);

            let mut eigenvalue = 0.0f64;
            for _iter in 0..max_iter {
                let w: Vec<f64> = (0..d)
                    .map(|i| math::dot(&work[i * d..(i + 1) * d], &v))
                    .collect();
                let new_eigenvalue = math::dot(&v, &w);
                let w_norm = math::dot(&w, &w).sqrt().max(1e-12);
                let new_v: Vec<f64> = w.iter().map(|&x| x / w_norm).collect();

                let diff = math::squared_distance(&v, &new_v).sqrt();
                v = new_v;
                eigenvalue = new_eigenvalue;
                if diff < tol {
                    break;
                }
            }

            eigenvalue = eigenvalue.max(0.0);
            eigenvalues.push(eigenvalue);

            // Deflate: work -= eigenvalue * v * v^T
            for i in 0..d {
                for j in 0..d {
                    work[i * d + j] -= eigenvalue * v[i] * v[j];
                }
            }
            eigenvectors.push(v);
        }

        (eigenvalues, eigenvectors)
    }
}

/// Covariance matrix (d x d, flat row-major) of centered data
fn covariance(data: &[Vec<f64>], d: usize) -> Vec<f64> {
    let n = data.len() as f64;
    let columns: Vec<Vec<f64>> = (0..d)
        .map(|j| data.iter().map(|row| row[j]).collect())
        .collect();

    let mut cov = vec![0.0f64; d * d];
    for i in 0..d {
        for j in i..d {
            let val = math::dot(&columns[i], &columns[j]) / (n - 1.0).max(1.0);
            cov[i * d + j] = val;
            cov[j * d + i] = val;
        }
    }
    cov
}
