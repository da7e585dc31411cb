//! UMAP — uniform manifold approximation and projection
//!
//! Three phases: brute-force KNN graph, fuzzy simplicial set with a
//! binary-search bandwidth per point, and SGD layout optimization with
//! negative sampling. Seeded throughout so repeated runs with identical
//! inputs and parameters produce identical embeddings.

use crate::error::{Result, VisualdataError};
use crate::utils::math;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// UMAP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UmapConfig {
    /// Neighborhood size; must stay below the sample count
    pub n_neighbors: usize,
    /// Minimum distance between embedded points
    pub min_dist: f64,
    /// Number of output dimensions
    pub n_components: usize,
    /// SGD epochs
    pub n_epochs: usize,
    /// SGD learning rate
    pub learning_rate: f64,
    /// Negative samples per positive edge
    pub negative_sample_rate: usize,
    /// Spread of the embedded points
    pub spread: f64,
    /// Seed for initialization and negative sampling
    pub random_state: u64,
}

impl Default for UmapConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 10,
            min_dist: 0.1,
            n_components: 2,
            n_epochs: 200,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            spread: 1.0,
            random_state: 42,
        }
    }
}

/// Neighbor candidate ordered as a max-heap by distance, so the farthest
/// neighbor can be evicted in O(log k)
#[derive(Clone)]
struct Neighbor {
    index: usize,
    distance: f64,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

/// Weighted edge of the fuzzy simplicial set
struct Edge {
    i: usize,
    j: usize,
    weight: f64,
}

pub struct Umap {
    config: UmapConfig,
}

impl Umap {
    pub fn new(config: UmapConfig) -> Self {
        Self { config }
    }

    /// Embed dense row-major data. Returns n_samples rows of n_components
    /// coordinates, in input order.
    pub fn fit_transform(&self, data: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let n = data.len();
        if n < 3 {
            return Err(VisualdataError::ReductionError(
                "UMAP requires at least 3 samples".to_string(),
            ));
        }
        if self.config.n_neighbors < 2 {
            return Err(VisualdataError::ReductionError(
                "n_neighbors must be at least 2".to_string(),
            ));
        }
        if self.config.n_neighbors >= n {
            return Err(VisualdataError::ReductionError(format!(
                "n_neighbors {} must be smaller than the sample count {}",
                self.config.n_neighbors, n
            )));
        }

        let k = self.config.n_neighbors;
        let (knn_indices, knn_distances) = compute_knn(data, k);
        let edges = self.fuzzy_simplicial_set(&knn_indices, &knn_distances, k);
        Ok(self.optimize_layout(n, &edges))
    }

    /// Per-point rho/sigma calibration followed by symmetrization:
    /// w(i,j) + w(j,i) - w(i,j) * w(j,i)
    fn fuzzy_simplicial_set(
        &self,
        knn_indices: &[Vec<usize>],
        knn_distances: &[Vec<f64>],
        k: usize,
    ) -> Vec<Edge> {
        let n = knn_indices.len();
        let target = (k as f64).ln() / std::f64::consts::LN_2;

        let params: Vec<(f64, f64)> = (0..n)
            .into_par_iter()
            .map(|i| {
                let dists = &knn_distances[i];
                let rho = if dists.is_empty() { 0.0 } else { dists[0].max(1e-12) };

                let mut lo = 1e-8_f64;
                let mut hi = 1000.0_f64;
                let mut sigma = 1.0;
                for _ in 0..64 {
                    sigma = (lo + hi) / 2.0;
                    let sum: f64 = dists
                        .iter()
                        .map(|&d| (-(d - rho).max(0.0) / sigma).exp())
                        .sum();
                    if (sum - target).abs() < 1e-5 {
                        break;
                    }
                    if sum > target {
                        hi = sigma;
                    } else {
                        lo = sigma;
                    }
                }
                (rho, sigma)
            })
            .collect();

        let mut directed: HashMap<(usize, usize), f64> = HashMap::with_capacity(n * k);
        for i in 0..n {
            let (rho, sigma) = params[i];
            for (rank, (&j, &d)) in knn_indices[i].iter().zip(knn_distances[i].iter()).enumerate() {
                let w = if rank == 0 {
                    1.0
                } else {
                    (-(d - rho).max(0.0) / sigma.max(1e-12)).exp()
                };
                directed.insert((i, j), w);
            }
        }

        let mut symmetric: HashMap<(usize, usize), f64> = HashMap::with_capacity(directed.len());
        for (&(i, j), &w_ij) in &directed {
            let key = if i < j { (i, j) } else { (j, i) };
            let w_ji = directed.get(&(j, i)).copied().unwrap_or(0.0);
            let w = w_ij + w_ji - w_ij * w_ji;
            symmetric
                .entry(key)
                .and_modify(|v| *v = v.max(w))
                .or_insert(w);
        }

        let mut edges: Vec<Edge> = symmetric
            .into_iter()
            .filter(|(_, w)| *w > 1e-8)
            .map(|((i, j), weight)| Edge { i, j, weight })
            .collect();
        // HashMap iteration order is arbitrary; sort for reproducibility
        edges.sort_by(|a, b| (a.i, a.j).cmp(&(b.i, b.j)));
        edges
    }

    /// SGD over the edge set with negative sampling, weight-scheduled edges
    fn optimize_layout(&self, n_samples: usize, edges: &[Edge]) -> Vec<Vec<f64>> {
        let dims = self.config.n_components;
        let (a, b) = find_ab_params(self.config.spread, self.config.min_dist);

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_state);
        let mut embedding: Vec<Vec<f64>> = (0..n_samples)
            .map(|_| (0..dims).map(|_| rng.gen_range(-10.0..10.0) * 0.01).collect())
            .collect();

        let n_epochs = self.config.n_epochs;
        let neg_rate = self.config.negative_sample_rate;
        let max_weight = edges.iter().map(|e| e.weight).fold(0.0_f64, f64::max);

        for epoch in 0..n_epochs {
            let alpha = self.config.learning_rate * (1.0 - epoch as f64 / n_epochs as f64);
            if alpha < 1e-8 {
                break;
            }

            for edge in edges {
                let epochs_per_sample = if edge.weight > 0.0 {
                    max_weight / edge.weight
                } else {
                    f64::INFINITY
                };
                if epoch as f64 % epochs_per_sample.max(1.0) >= 1.0 {
                    continue;
                }

                let (i, j) = (edge.i, edge.j);

                let dist_sq = math::squared_distance(&embedding[i], &embedding[j]) + 1e-8;
                let attract = -2.0 * a * b * dist_sq.powf(b - 1.0) / (1.0 + a * dist_sq.powf(b));
                for k in 0..dims {
                    let grad = attract * (embedding[i][k] - embedding[j][k]);
                    embedding[i][k] = (embedding[i][k] + alpha * grad).clamp(-10.0, 10.0);
                    embedding[j][k] = (embedding[j][k] - alpha * grad).clamp(-10.0, 10.0);
                }

                for _ in 0..neg_rate {
                    let other = rng.gen_range(0..n_samples);
                    if other == i {
                        continue;
                    }
                    let dist_sq = math::squared_distance(&embedding[i], &embedding[other]) + 1e-8;
                    let repel = 2.0 * b / ((0.001 + dist_sq) * (1.0 + a * dist_sq.powf(b)));
                    for k in 0..dims {
                        let grad = repel * (embedding[i][k] - embedding[other][k]);
                        embedding[i][k] = (embedding[i][k] + alpha * grad).clamp(-10.0, 10.0);
                    }
                }
            }
        }

        embedding
    }
}

/// Brute-force k-nearest neighbors, parallelized over query points
fn compute_knn(data: &[Vec<f64>], k: usize) -> (Vec<Vec<usize>>, Vec<Vec<f64>>) {
    let n = data.len();

    let results: Vec<(Vec<usize>, Vec<f64>)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k + 1);
            for j in 0..n {
                if i == j {
                    continue;
                }
                let dist = math::squared_distance(&data[i], &data[j]).sqrt();
                if heap.len() < k {
                    heap.push(Neighbor { index: j, distance: dist });
                } else if let Some(top) = heap.peek() {
                    if dist < top.distance {
                        heap.pop();
                        heap.push(Neighbor { index: j, distance: dist });
                    }
                }
            }

            let mut neighbors = heap.into_vec();
            neighbors.sort_by(|x, y| {
                x.distance
                    .partial_cmp(&y.distance)
                    .unwrap_or(Ordering::Equal)
                    .then(x.index.cmp(&y.index))
            });
            (
                neighbors.iter().map(|nb| nb.index).collect(),
                neighbors.iter().map(|nb| nb.distance).collect(),
            )
        })
        .collect();

    let mut indices = Vec::with_capacity(n);
    let mut distances = Vec::with_capacity(n);
    for (idx, dist) in results {
        indices.push(idx);
        distances.push(dist);
    }
    (indices, distances)
}

/// Fit the curve 1 / (1 + a * d^(2b)) so it behaves like a smooth step
/// around `min_dist`
fn find_ab_params(spread: f64, min_dist: f64) -> (f64, f64) {
    let mut b = 1.0;
    let a;

    if (spread - 1.0).abs() < 1e-6 {
        a = if min_dist > 0.0 {
            (2.0_f64.powf(2.0 * b) - 1.0) / min_dist.powf(2.0 * b)
        } else {
            1.0
        };
    } else {
        let mut lo = 0.1_f64;
        let mut hi = 5.0_f64;
        for _ in 0..64 {
            b = (lo + hi) / 2.0;
            let candidate = (2.0_f64.powf(2.0 * b) - 1.0) / spread.powf(2.0 * b);
            let val = 1.0 / (1.0 + candidate * min_dist.powf(2.0 * b));
            if val > 0.99 {
                hi = b;
            } else {
                lo = b;
            }
        }
        a = (2.0_f64.powf(2.0 * b) - 1.0) / spread.powf(2.0 * b);
    }

    (a.max(1e-8), b.max(0.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_clusters(per_cluster: usize) -> Vec<Vec<f64>> {
        let mut data = Vec::new();
        for i in 0..per_cluster {
            data.push(vec![i as f64 * 0.01, i as f64 * 0.01, 0.0]);
        }
        for i in 0..per_cluster {
            data.push(vec![10.0 + i as f64 * 0.01, 10.0 + i as f64 * 0.01, 10.0]);
        }
        data
    }

    #[test]
    fn test_umap_shape() {
        let data = two_clusters(6);
        let config = UmapConfig {
            n_neighbors: 3,
            n_epochs: 80,
            ..Default::default()
        };
        let result = Umap::new(config).fit_transform(&data).unwrap();
        assert_eq!(result.len(), 12);
        assert!(result.iter().all(|p| p.len() == 2));
        assert!(result.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_umap_three_components() {
        let data = two_clusters(6);
        let config = UmapConfig {
            n_neighbors: 3,
            n_components: 3,
            n_epochs: 80,
            ..Default::default()
        };
        let result = Umap::new(config).fit_transform(&data).unwrap();
        assert!(result.iter().all(|p| p.len() == 3));
    }

    #[test]
    fn test_umap_separates_clusters() {
        let data = two_clusters(20);
        let config = UmapConfig {
            n_neighbors: 5,
            n_epochs: 200,
            ..Default::default()
        };
        let result = Umap::new(config).fit_transform(&data).unwrap();

        let mean = |points: &[Vec<f64>]| {
            let n = points.len() as f64;
            (
                points.iter().map(|p| p[0]).sum::<f64>() / n,
                points.iter().map(|p| p[1]).sum::<f64>() / n,
            )
        };
        let (ax, ay) = mean(&result[..20]);
        let (bx, by) = mean(&result[20..]);
        let dist = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
        assert!(dist > 0.5, "clusters should separate, got {dist}");
    }

    #[test]
    fn test_umap_deterministic_for_fixed_seed() {
        let data = two_clusters(8);
        let config = UmapConfig {
            n_neighbors: 4,
            n_epochs: 100,
            ..Default::default()
        };
        let a = Umap::new(config.clone()).fit_transform(&data).unwrap();
        let b = Umap::new(config).fit_transform(&data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_umap_rejects_n_neighbors_at_sample_count() {
        let data = two_clusters(3);
        let config = UmapConfig {
            n_neighbors: 6,
            ..Default::default()
        };
        let err = Umap::new(config).fit_transform(&data).unwrap_err();
        assert!(matches!(err, VisualdataError::ReductionError(_)));
    }

    #[test]
    fn test_umap_rejects_tiny_input() {
        let data = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert!(Umap::new(UmapConfig::default()).fit_transform(&data).is_err());
    }

    #[test]
    fn test_find_ab_params_standard_spread() {
        let (a, b) = find_ab_params(1.0, 0.1);
        assert!(a > 0.0);
        assert!((b - 1.0).abs() < 1e-9);
    }
}
