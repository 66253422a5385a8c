//! Min-max normalization onto [0, 1]

use crate::timeline::ScoreSeries;

/// Ranges narrower than this count as constant
const FLAT_RANGE: f64 = 1e-10;

/// Rescales a score series so its minimum maps to 0 and its maximum to 1.
///
/// A constant series (range below `1e-10`) becomes all zeros rather than
/// dividing by zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreNormalizer;

impl ScoreNormalizer {
    pub fn normalize(series: &ScoreSeries) -> Vec<f64> {
        normalize_values(series.values())
    }
}

pub(crate) fn normalize_values(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if values.is_empty() || range < FLAT_RANGE {
        return vec![0.0; values.len()];
    }

    values
        .iter()
        .map(|v| ((v - min) / range).clamp(0.0, 1.0))
        .collect()
}
