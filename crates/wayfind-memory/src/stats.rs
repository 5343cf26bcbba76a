//! Outlier statistics and small vector helpers.
//!
//! The route memory scores every corpus image by its cosine distance to the
//! current frame and then asks which distances are *unusually small* for
//! this frame.  Three independent robust tests are used, all derived from the
//! distance vector itself:
//!
//! ```text
//! mu   = mean(d) + eps
//! std  = sqrt(mean((d - mean(d))²))           population standard deviation
//! lqr  = Q1 - 1.5 · (Q3 - Q1)                 Tukey lower fence
//! mad  = 1.4826 · median(|d - median(d)|)     scaled median absolute deviation
//! ```
//!
//! Percentiles use linear interpolation between closest ranks.
//!
//! # Example
//!
//! ```rust
//! use wayfind_memory::stats::{OutlierStats, softmax};
//!
//! let stats = OutlierStats::compute(&[0.0, 1.0, 1.0, 1.0], 1e-6, 1.4826);
//! assert!((stats.lower_fence - 0.375).abs() < 1e-6);
//! assert_eq!(stats.hits(0.0), 2);
//!
//! let p = softmax(&[0.0, 0.0]);
//! assert!((p[0] - 0.5).abs() < 1e-6);
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Vector helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Dot product of two equal-length vectors.
///
/// Callers validate dimensions; extra elements of the longer slice are
/// ignored.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Numerically stable softmax.  Returns an empty vector for empty input.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let Some(max) = logits.iter().copied().reduce(f32::max) else {
        return Vec::new();
    };
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the first minimum, or `None` for an empty slice.
pub fn argmin(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v >= b || v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the first maximum, or `None` for an empty slice.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b || v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptive statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Arithmetic mean.  Returns `0.0` for an empty slice.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f64 = values.iter().map(|&v| f64::from(v)).sum();
    (sum / values.len() as f64) as f32
}

/// Population standard deviation (divides by `n`).  Returns `0.0` for an
/// empty slice.
pub fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mu: f64 = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var: f64 = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mu;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt() as f32
}

/// The `q`-th percentile (`q` in `[0, 100]`) using linear interpolation
/// between the two nearest ranks.  Returns `0.0` for an empty slice.
pub fn percentile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    percentile_sorted(&sorted, q)
}

fn percentile_sorted(sorted: &[f32], q: f32) -> f32 {
    let rank = f64::from(q.clamp(0.0, 100.0)) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    let (a, b) = (f64::from(sorted[lo]), f64::from(sorted[hi]));
    (a + (b - a) * frac) as f32
}

/// Median (50th percentile).
pub fn median(values: &[f32]) -> f32 {
    percentile(values, 50.0)
}

/// Median absolute deviation, multiplied by `scale`.
///
/// A `scale` of `1.4826` makes the MAD a consistent estimator of the standard
/// deviation for normally distributed data.
pub fn median_absolute_deviation(values: &[f32], scale: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let center = median(values);
    let deviations: Vec<f32> = values.iter().map(|v| (v - center).abs()).collect();
    scale * median(&deviations)
}

// ─────────────────────────────────────────────────────────────────────────────
// OutlierStats
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of one distance vector used by the three outlier tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierStats {
    /// Mean distance plus a small epsilon so it can be divided by.
    pub mu: f32,
    /// Population standard deviation of the distances.
    pub std: f32,
    /// Tukey lower fence: `Q1 − 1.5·IQR`.
    pub lower_fence: f32,
    /// Scaled median absolute deviation.
    pub mad: f32,
}

impl OutlierStats {
    /// Compute the statistics over `distances`.
    pub fn compute(distances: &[f32], eps: f32, mad_scale: f32) -> Self {
        let mut sorted = distances.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let lower_fence = if sorted.is_empty() {
            0.0
        } else {
            let q25 = percentile_sorted(&sorted, 25.0);
            let q75 = percentile_sorted(&sorted, 75.0);
            q25 - 1.5 * (q75 - q25)
        };
        Self {
            mu: mean(distances) + eps,
            std: std_dev(distances),
            lower_fence,
            mad: median_absolute_deviation(distances, mad_scale),
        }
    }

    /// Number of outlier tests (0..=3) that the distance `d` passes.
    pub fn hits(&self, d: f32) -> usize {
        [d / self.mu < self.std, d < self.lower_fence, d < self.mad]
            .into_iter()
            .filter(|&hit| hit)
            .count()
    }
}
