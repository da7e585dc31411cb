//! t-SNE — t-distributed stochastic neighbor embedding
//!
//! Exact (non-approximated) t-SNE: Gaussian input affinities calibrated per
//! point to a target perplexity by binary search, Student-t output kernel,
//! gradient descent with momentum and early exaggeration. Quadratic in the
//! sample count, which is fine at the dataset sizes the orchestrator routes
//! here. Seeded initialization makes repeated runs reproducible.

use crate::error::{Result, VisualdataError};
use crate::utils::math;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// t-SNE configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsneConfig {
    /// Number of output dimensions
    pub n_components: usize,
    /// Effective neighborhood size; must stay below the sample count
    pub perplexity: f64,
    /// Gradient descent step size
    pub learning_rate: f64,
    /// Total gradient descent iterations
    pub n_iter: usize,
    /// Affinity multiplier during the early phase
    pub early_exaggeration: f64,
    /// Iterations spent in the early-exaggeration phase
    pub exaggeration_iters: usize,
    /// Seed for embedding initialization
    pub random_state: u64,
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            perplexity: 5.0,
            learning_rate: 200.0,
            n_iter: 500,
            early_exaggeration: 12.0,
            exaggeration_iters: 100,
            random_state: 42,
        }
    }
}

pub struct Tsne {
    config: TsneConfig,
}

impl Tsne {
    pub fn new(config: TsneConfig) -> Self {
        Self { config }
    }

    /// Embed dense row-major data. Returns n_samples rows of n_components
    /// coordinates, in input order.
    pub fn fit_transform(&self, data: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let n = data.len();
        if n < 4 {
            return Err(VisualdataError::ReductionError(
                "t-SNE requires at least 4 samples".to_string(),
            ));
        }
        if self.config.perplexity < 1.0 {
            return Err(VisualdataError::ReductionError(
                "perplexity must be at least 1".to_string(),
            ));
        }
        if self.config.perplexity >= n as f64 {
            return Err(VisualdataError::ReductionError(format!(
                "perplexity {} must be smaller than the sample count {}",
                self.config.perplexity, n
            )));
        }

        let distances = pairwise_squared_distances(data);
        let p = self.joint_probabilities(&distances, n);
        Ok(self.gradient_descent(&p, n))
    }

    /// Symmetrized affinities: per-point Gaussian kernels calibrated to the
    /// target perplexity, then P = (P + P^T) / 2n.
    fn joint_probabilities(&self, distances: &[f64], n: usize) -> Vec<f64> {
        let target_entropy = self.config.perplexity.ln();

        let conditional: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let row = &distances[i * n..(i + 1) * n];
                calibrate_row(row, i, target_entropy)
            })
            .collect();

        let mut p = vec![0.0f64; n * n];
        let norm = 1.0 / (2.0 * n as f64);
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                p[i * n + j] = ((conditional[i][j] + conditional[j][i]) * norm).max(1e-12);
            }
        }
        p
    }

    fn gradient_descent(&self, p: &[f64], n: usize) -> Vec<Vec<f64>> {
        let dims = self.config.n_components;
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_state);
        let mut y: Vec<Vec<f64>> = (0..n)
            .map(|_| (0..dims).map(|_| rng.gen_range(-1e-4..1e-4)).collect())
            .collect();
        let mut velocity = vec![vec![0.0f64; dims]; n];

        for iter in 0..self.config.n_iter {
            let exaggeration = if iter < self.config.exaggeration_iters {
                self.config.early_exaggeration
            } else {
                1.0
            };
            let momentum = if iter < self.config.n_iter / 2 { 0.5 } else { 0.8 };

            // Student-t normalization constant over all pairs. The partial
            // sums are reduced sequentially so the result does not depend on
            // rayon's scheduling.
            let row_sums: Vec<f64> = (0..n)
                .into_par_iter()
                .map(|i| {
                    let mut acc = 0.0;
                    for j in 0..n {
                        if i != j {
                            acc += 1.0 / (1.0 + math::squared_distance(&y[i], &y[j]));
                        }
                    }
                    acc
                })
                .collect();
            let sum_q = row_sums.iter().sum::<f64>().max(1e-12);

            let gradients: Vec<Vec<f64>> = (0..n)
                .into_par_iter()
                .map(|i| {
                    let mut grad = vec![0.0f64; dims];
                    for j in 0..n {
                        if i == j {
                            continue;
                        }
                        let q_num = 1.0 / (1.0 + math::squared_distance(&y[i], &y[j]));
                        let q = q_num / sum_q;
                        let coeff = 4.0 * (exaggeration * p[i * n + j] - q) * q_num;
                        for k in 0..dims {
                            grad[k] += coeff * (y[i][k] - y[j][k]);
                        }
                    }
                    grad
                })
                .collect();

            for i in 0..n {
                for k in 0..dims {
                    velocity[i][k] =
                        momentum * velocity[i][k] - self.config.learning_rate * gradients[i][k];
                    y[i][k] += velocity[i][k];
                }
            }

            // Keep the embedding centered so it cannot drift
            for k in 0..dims {
                let mean = y.iter().map(|row| row[k]).sum::<f64>() / n as f64;
                for row in y.iter_mut() {
                    row[k] -= mean;
                }
            }
        }

        y
    }
}

/// Flat n x n matrix of squared euclidean distances
fn pairwise_squared_distances(data: &[Vec<f64>]) -> Vec<f64> {
    let n = data.len();
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| {
                    if i == j {
                        0.0
                    } else {
                        math::squared_distance(&data[i], &data[j])
                    }
                })
                .collect()
        })
        .collect();
    rows.into_iter().flatten().collect()
}

/// Binary search the Gaussian precision for one point until the entropy of
/// its conditional distribution matches the target perplexity.
fn calibrate_row(distances: &[f64], i: usize, target_entropy: f64) -> Vec<f64> {
    let n = distances.len();
    let mut beta = 1.0f64;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;
    let mut probs = vec![0.0f64; n];

    for _ in 0..50 {
        let mut sum_p = 0.0;
        for j in 0..n {
            probs[j] = if j == i {
                0.0
            } else {
                (-distances[j] * beta).exp()
            };
            sum_p += probs[j];
        }
        let sum_p = sum_p.max(1e-300);

        let weighted: f64 = (0..n)
            .filter(|&j| j != i)
            .map(|j| distances[j] * probs[j])
            .sum();
        let entropy = sum_p.ln() + beta * weighted / sum_p;

        let diff = entropy - target_entropy;
        if diff.abs() < 1e-5 {
            break;
        }
        if diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_finite() {
                (beta + beta_max) / 2.0
            } else {
                beta * 2.0
            };
        } else {
            beta_max = beta;
            beta = if beta_min.is_finite() {
                (beta + beta_min) / 2.0
            } else {
                beta / 2.0
            };
        }
    }

    let sum_p: f64 = probs.iter().sum::<f64>().max(1e-300);
    probs.iter().map(|&p| p / sum_p).collect()
}
