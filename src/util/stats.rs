
/// Returns the mean and population standard deviation of a set of values.
/// An empty input returns (0.0, 0.0).
pub fn mean_and_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Rounds a value to a number of significant digits, used for report formatting
pub fn round_significant(value: f64, digits: u32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let scale = 10f64.powi(digits as i32 - 1 - magnitude);
    (value * scale).round() / scale
}
