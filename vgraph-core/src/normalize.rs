//! Numeric rescaling primitives shared by mapper profiles.

/// Natural log of each value; non-positive inputs map to 0.
pub fn log_transform(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|&v| if v <= 0.0 { 0.0 } else { v.ln() })
        .collect()
}

/// Rescale values into `[minimum, maximum]`, flooring to whole steps.
///
/// The span is divided by `max - min + 1`, so the largest input lands
/// strictly below `maximum` unless the range is degenerate.
pub fn normalize(values: &[f64], minimum: f64, maximum: f64) -> Vec<f64> {
    let Some((min, scale)) = scale_factor(values, minimum, maximum) else {
        return Vec::new();
    };
    values
        .iter()
        .map(|&v| minimum + ((v - min) * scale).floor())
        .collect()
}

/// Same as [`normalize`] without flooring.
pub fn normalize_float(values: &[f64], minimum: f64, maximum: f64) -> Vec<f64> {
    let Some((min, scale)) = scale_factor(values, minimum, maximum) else {
        return Vec::new();
    };
    values.iter().map(|&v| minimum + (v - min) * scale).collect()
}

fn scale_factor(values: &[f64], minimum: f64, maximum: f64) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    Some((min, (maximum - minimum) / (max - min + 1.0)))
}
