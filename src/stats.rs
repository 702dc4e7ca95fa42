//! Statistical kernels for grouped outlier detection.
//!
//! All functions are safe against degenerate inputs: empty groups,
//! single-element groups, and zero-variance groups never yield NaN or inf.

/// Arithmetic mean; 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (ddof = 1); 0.0 when fewer than 2 elements
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Per-element Z-scores: (value − mean) / sample std-dev.
///
/// Returns all zeros when the standard deviation is zero or undefined
/// (fewer than 2 elements, or all-equal elements). A degenerate group is
/// never flagged rather than producing spurious infinite outliers.
pub fn zscores(values: &[f64]) -> Vec<f64> {
    let std = sample_std(values);
    if std == 0.0 || std.is_nan() {
        return vec![0.0; values.len()];
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) / std).collect()
}

/// Percentile with linear interpolation between adjacent ranks.
/// `q` in [0, 1]. Returns 0.0 for an empty slice.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
