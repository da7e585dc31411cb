//! Scalar statistics and distance kernels shared by the profiler and the
//! embedding algorithms.

/// Sum of a slice
pub fn sum(data: &[f64]) -> f64 {
    data.iter().sum()
}

/// Arithmetic mean; 0.0 for an empty slice
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    sum(data) / data.len() as f64
}

/// Unbiased sample variance (ddof = 1); 0.0 for fewer than 2 values
pub fn sample_variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

/// Unbiased sample standard deviation
pub fn sample_std(data: &[f64]) -> f64 {
    sample_variance(data).sqrt()
}

/// Dot product
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Squared euclidean distance between two points
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

/// Percentile by linear interpolation between order statistics.
///
/// `sorted` must be ascending and non-empty; `q` is a fraction in [0, 1].
pub fn percentile_linear(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
