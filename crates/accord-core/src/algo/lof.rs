//! Local Outlier Factor
//!
//! Compares each point's local reachability density with that of its k
//! nearest neighbors. Points in sparser regions than their neighbors get a
//! factor well above 1. Only defined for the training set itself, so the
//! model exposes a combined fit-and-score call.
//!
//! Reference: "LOF: Identifying Density-Based Local Outliers" (Breunig et al.,
//! SIGMOD 2000)

use super::{Contamination, ModelError, Params, percentile_of, squared_distance};
use crate::scorer::TransductiveModel;
use crate::window::FeatureMatrix;
use serde_json::{Map, Value};
use tracing::debug;

/// Offset used when contamination is `auto`
const AUTO_OFFSET: f64 = -1.5;

/// Keeps density finite when k neighbors coincide
const DENSITY_EPSILON: f64 = 1e-10;

/// Local outlier factor over the rows of one matrix
#[derive(Debug, Clone)]
pub struct LocalOutlierFactor {
    n_neighbors: usize,
    contamination: Contamination,
    negative_outlier_factor: Vec<f64>,
    offset: f64,
}

impl LocalOutlierFactor {
    pub fn new(n_neighbors: usize, contamination: Contamination) -> Result<Self, ModelError> {
        if n_neighbors == 0 {
            return Err(ModelError::bad_param("n_neighbors", "must be >= 1"));
        }
        Ok(Self {
            n_neighbors,
            contamination,
            negative_outlier_factor: Vec::new(),
            offset: AUTO_OFFSET,
        })
    }

    /// Keys: `n_neighbors` (20), `contamination` (`"auto"` or a fraction)
    pub fn from_params(params: &Map<String, Value>) -> Result<Self, ModelError> {
        let params = Params::new(params, &["n_neighbors", "contamination"])?;
        Self::new(params.usize_or("n_neighbors", 20)?, params.contamination()?)
    }

    /// `-LOF` of each training row from the last fit
    pub fn negative_outlier_factor(&self) -> &[f64] {
        &self.negative_outlier_factor
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

/// Indices and distances of the `k` nearest other rows, nearest first.
///
/// Ties are broken by row index.
fn nearest_neighbors(rows: &[Vec<f64>], k: usize) -> Vec<Vec<(usize, f64)>> {
    rows.iter()
        .enumerate()
        .map(|(p, a)| {
            let mut others: Vec<(usize, f64)> = rows
                .iter()
                .enumerate()
                .filter(|(o, _)| *o != p)
                .map(|(o, b)| (o, squared_distance(a, b).sqrt()))
                .collect();
            others.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
            others.truncate(k);
            others
        })
        .collect()
}

impl TransductiveModel for LocalOutlierFactor {
    fn fit_normality(&mut self, features: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        let n = features.n_rows();
        if n < 2 {
            return Err(ModelError::InsufficientRows {
                required: 2,
                found: n,
            });
        }

        // Fewer rows than neighbors: use every other row
        let k = self.n_neighbors.min(n - 1);
        let neighbors = nearest_neighbors(features.rows(), k);
        let k_distance: Vec<f64> = neighbors
            .iter()
            .map(|nn| nn.last().map_or(0.0, |&(_, d)| d))
            .collect();

        let lrd: Vec<f64> = neighbors
            .iter()
            .map(|nn| {
                let reach: f64 = nn.iter().map(|&(o, d)| d.max(k_distance[o])).sum();
                1.0 / (reach / k as f64 + DENSITY_EPSILON)
            })
            .collect();

        self.negative_outlier_factor = neighbors
            .iter()
            .zip(&lrd)
            .map(|(nn, &own)| {
                let ratio: f64 = nn.iter().map(|&(o, _)| lrd[o] / own).sum();
                -(ratio / k as f64)
            })
            .collect();

        self.offset = match self.contamination {
            Contamination::Auto => AUTO_OFFSET,
            Contamination::Fraction(c) => percentile_of(&self.negative_outlier_factor, 100.0 * c),
        };

        debug!(rows = n, k, offset = self.offset, "Local outlier factor computed");
        Ok(self
            .negative_outlier_factor
            .iter()
            .map(|nof| nof - self.offset)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_point_has_high_factor() {
        let mut rows: Vec<Vec<f64>> = (0..30)
            .map(|i| vec![(i % 6) as f64 * 0.1, (i / 6) as f64 * 0.1])
            .collect();
        rows.push(vec![5.0, 5.0]);
        let features = FeatureMatrix::from_rows(rows).unwrap();

        let mut lof = LocalOutlierFactor::new(5, Contamination::Auto).unwrap();
        let normality = lof.fit_normality(&features).unwrap();

        let outlier = normality[30];
        assert!(outlier < 0.0, "Isolated point should be below the boundary");
        assert!(normality[..30].iter().all(|&v| v > outlier));
        assert!(lof.negative_outlier_factor()[30] < -1.5);
    }

    #[test]
    fn test_uniform_grid_factor_near_one() {
        let rows: Vec<Vec<f64>> = (0..49).map(|i| vec![(i % 7) as f64, (i / 7) as f64]).collect();
        let features = FeatureMatrix::from_rows(rows).unwrap();
        let mut lof = LocalOutlierFactor::new(4, Contamination::Auto).unwrap();
        lof.fit_normality(&features).unwrap();

        // Center of the grid has neighbors exactly like itself
        let center = lof.negative_outlier_factor()[24];
        assert!((center + 1.0).abs() < 1e-6, "Expected LOF 1, got {}", -center);
    }

    #[test]
    fn test_constant_input_is_zero_with_contamination() {
        let features = FeatureMatrix::from_rows(vec![vec![1.0, 1.0]; 25]).unwrap();
        let mut lof = LocalOutlierFactor::new(20, Contamination::Fraction(0.1)).unwrap();
        let normality = lof.fit_normality(&features).unwrap();
        assert!(normality.iter().all(|&v| v == 0.0), "{:?}", &normality[..3]);
    }

    #[test]
    fn test_neighbors_clamped_to_row_count() {
        let features = FeatureMatrix::from_rows(vec![vec![0.0], vec![1.0], vec![3.0]]).unwrap();
        let mut lof = LocalOutlierFactor::new(20, Contamination::Auto).unwrap();
        let normality = lof.fit_normality(&features).unwrap();
        assert_eq!(normality.len(), 3);
        assert!(normality.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_insufficient_rows() {
        let features = FeatureMatrix::from_rows(vec![vec![0.0]]).unwrap();
        let mut lof = LocalOutlierFactor::new(3, Contamination::Auto).unwrap();
        assert_eq!(
            lof.fit_normality(&features),
            Err(ModelError::InsufficientRows {
                required: 2,
                found: 1
            })
        );
    }
}
