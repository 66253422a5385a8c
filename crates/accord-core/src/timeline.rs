//! Window scores back onto the timeline
//!
//! Each window's score lands on its center timestep. Colliding centers keep
//! the maximum, and the initial sentinel `0` takes part in that maximum, so
//! negative scores floor at zero and unmapped timesteps stay at zero.

use crate::error::{AccordError, Result};
use crate::window::FeatureMatrix;
use serde::{Deserialize, Serialize};

/// Initial value of every timestep
pub const SENTINEL: f64 = 0.0;

/// Per-timestep scores of one lane, length `N`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreSeries(Vec<f64>);

impl ScoreSeries {
    /// All-sentinel series of length `len`
    pub fn sentinel(len: usize) -> Self {
        Self(vec![SENTINEL; len])
    }

    pub fn from_values(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.0
    }

    /// Fold one score into timestep `t`
    fn absorb(&mut self, t: usize, score: f64) {
        self.0[t] = self.0[t].max(score);
    }

    /// Elementwise maximum of two series of equal length
    pub fn merge_max(&self, other: &ScoreSeries) -> Result<ScoreSeries> {
        if self.len() != other.len() {
            return Err(AccordError::invalid_input(format!(
                "cannot merge series of length {} and {}",
                self.len(),
                other.len()
            )));
        }
        Ok(Self(
            self.0.iter().zip(&other.0).map(|(a, b)| a.max(*b)).collect(),
        ))
    }
}

/// Center mapping with max aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineReconstructor {
    window_size: usize,
    stride: usize,
}

impl TimelineReconstructor {
    pub fn new(window_size: usize, stride: usize) -> Result<Self> {
        if window_size == 0 || stride == 0 {
            return Err(AccordError::invalid_config(
                "window_size and stride must be > 0",
            ));
        }
        Ok(Self {
            window_size,
            stride,
        })
    }

    /// Map `scores[i]` (window at offset `i × stride`) to its center
    pub fn reconstruct(&self, scores: &[f64], series_len: usize) -> Result<ScoreSeries> {
        let centers: Vec<usize> = (0..scores.len())
            .map(|i| i * self.stride + self.window_size / 2)
            .collect();
        Self::reconstruct_at(&centers, scores, series_len)
    }

    /// Map scores using the offsets recorded in `matrix`
    pub fn reconstruct_matrix(
        matrix: &FeatureMatrix,
        scores: &[f64],
        series_len: usize,
    ) -> Result<ScoreSeries> {
        if scores.len() != matrix.n_rows() {
            return Err(AccordError::invalid_input(format!(
                "{} scores for {} feature rows",
                scores.len(),
                matrix.n_rows()
            )));
        }
        Self::reconstruct_at(&matrix.centers(), scores, series_len)
    }

    /// Fold `scores[i]` into `centers[i]`; repeated centers keep the maximum
    pub fn reconstruct_at(
        centers: &[usize],
        scores: &[f64],
        series_len: usize,
    ) -> Result<ScoreSeries> {
        if centers.len() != scores.len() {
            return Err(AccordError::invalid_input(format!(
                "{} centers for {} scores",
                centers.len(),
                scores.len()
            )));
        }

        let mut series = ScoreSeries::sentinel(series_len);
        for (&center, &score) in centers.iter().zip(scores) {
            if center >= series_len {
                return Err(AccordError::invalid_input(format!(
                    "window center {} outside series of length {}",
                    center, series_len
                )));
            }
            series.absorb(center, score);
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centers_and_sentinel() {
        // N = 8, W = 4: offsets 0..=4, centers 2..=6
        let reconstructor = TimelineReconstructor::new(4, 1).unwrap();
        let series = reconstructor
            .reconstruct(&[0.3, 0.9, 0.1, 0.4, 0.7], 8)
            .unwrap();
        assert_eq!(
            series.values(),
            &[0.0, 0.0, 0.3, 0.9, 0.1, 0.4, 0.7, 0.0]
        );
    }

    #[test]
    fn test_negative_scores_floor_at_sentinel() {
        let reconstructor = TimelineReconstructor::new(2, 1).unwrap();
        let series = reconstructor.reconstruct(&[-1.0, 0.5, -0.2], 4).unwrap();
        assert_eq!(series.values(), &[0.0, 0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_strided_centers() {
        let reconstructor = TimelineReconstructor::new(5, 3).unwrap();
        let series = reconstructor.reconstruct(&[1.0, 2.0, 3.0], 11).unwrap();
        // Centers 2, 5, 8
        assert_eq!(series.values()[2], 1.0);
        assert_eq!(series.values()[5], 2.0);
        assert_eq!(series.values()[8], 3.0);
        assert_eq!(series.values().iter().filter(|&&v| v == 0.0).count(), 8);
    }

    #[test]
    fn test_colliding_centers_keep_max() {
        let series =
            TimelineReconstructor::reconstruct_at(&[3, 3, 1, 3], &[0.2, 0.8, 0.5, 0.4], 5)
                .unwrap();
        assert_eq!(series.values(), &[0.0, 0.5, 0.0, 0.8, 0.0]);

        // Order of arrival does not matter
        let reversed =
            TimelineReconstructor::reconstruct_at(&[3, 1, 3, 3], &[0.4, 0.5, 0.8, 0.2], 5)
                .unwrap();
        assert_eq!(series, reversed);
    }

    #[test]
    fn test_center_out_of_range() {
        let reconstructor = TimelineReconstructor::new(4, 1).unwrap();
        let result = reconstructor.reconstruct(&[0.1; 4], 4);
        assert!(matches!(result, Err(AccordError::InvalidInput(_))));
    }

    #[test]
    fn test_merge_max_idempotent() {
        let series = ScoreSeries::from_values(vec![0.0, 0.4, 0.2]);
        assert_eq!(series.merge_max(&series).unwrap(), series);

        let other = ScoreSeries::from_values(vec![0.1, 0.3, 0.9]);
        assert_eq!(series.merge_max(&other).unwrap().values(), &[0.1, 0.4, 0.9]);
        assert!(series.merge_max(&ScoreSeries::sentinel(2)).is_err());
    }

    #[test]
    fn test_matrix_offsets_drive_mapping() {
        let matrix =
            FeatureMatrix::new(vec![vec![0.0]; 3], vec![0, 4, 8], 4).unwrap();
        let series =
            TimelineReconstructor::reconstruct_matrix(&matrix, &[0.1, 0.2, 0.3], 12).unwrap();
        assert_eq!(series.values()[2], 0.1);
        assert_eq!(series.values()[6], 0.2);
        assert_eq!(series.values()[10], 0.3);
    }
}
