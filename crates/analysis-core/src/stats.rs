//! Small numeric helpers shared by the providers.

/// Mean of a slice; 0.0 when empty.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Linear map of `x` from `[lo, hi]` onto 0-100, clamped.
pub fn scale_to_score(x: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo || !x.is_finite() {
        return 50.0;
    }
    ((x - lo) / (hi - lo) * 100.0).clamp(0.0, 100.0)
}
