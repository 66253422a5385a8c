//! Isolation Forest
//!
//! Anomalies are few and different, so random axis-aligned cuts isolate
//! them in fewer steps than normal points. The expected path length over a
//! forest of random trees, normalized by the average unsuccessful-search
//! length `c(ψ)` of a binary search tree, gives the score.
//!
//! Reference: "Isolation Forest" (Liu, Ting, Zhou, ICDM 2008)

use super::{Contamination, ModelError, Params, percentile_of};
use crate::scorer::NormalityModel;
use crate::window::FeatureMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};
use tracing::debug;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Offset used when contamination is `auto`
const AUTO_OFFSET: f64 = -0.5;

/// A node of an isolation tree
#[derive(Debug, Clone)]
enum IsoNode {
    /// Axis-aligned cut; rows with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: Box<IsoNode>,
        right: Box<IsoNode>,
    },
    /// Unsplit remainder of `size` training rows
    Leaf { size: usize },
}

impl IsoNode {
    fn path_length(&self, point: &[f64], depth: usize) -> f64 {
        match self {
            Self::Leaf { size } => depth as f64 + average_path_length(*size),
            Self::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if point[*feature] <= *threshold {
                    left.path_length(point, depth + 1)
                } else {
                    right.path_length(point, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Grow one tree over `indices` until isolation, identical rows, or `max_depth`
fn grow(
    rows: &[Vec<f64>],
    indices: &mut [usize],
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> IsoNode {
    if indices.len() <= 1 || depth >= max_depth {
        return IsoNode::Leaf {
            size: indices.len(),
        };
    }

    // Only features that still vary inside this node can split it
    let width = rows[indices[0]].len();
    let mut candidates = Vec::new();
    for feature in 0..width {
        let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            (lo.min(rows[i][feature]), hi.max(rows[i][feature]))
        });
        if lo < hi {
            candidates.push((feature, lo, hi));
        }
    }
    if candidates.is_empty() {
        return IsoNode::Leaf {
            size: indices.len(),
        };
    }

    let (feature, lo, hi) = candidates[rng.random_range(0..candidates.len())];
    let threshold = rng.random_range(lo..hi);

    // In-place partition: left block is `<= threshold`
    let mut split = 0;
    for k in 0..indices.len() {
        if rows[indices[k]][feature] <= threshold {
            indices.swap(k, split);
            split += 1;
        }
    }
    let (left, right) = indices.split_at_mut(split);

    IsoNode::Split {
        feature,
        threshold,
        left: Box::new(grow(rows, left, depth + 1, max_depth, rng)),
        right: Box::new(grow(rows, right, depth + 1, max_depth, rng)),
    }
}

/// Isolation forest with a decision-function offset
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    contamination: Contamination,
    seed: u64,

    trees: Vec<IsoNode>,
    /// Subsample size actually used (`min(max_samples, n_rows)`)
    sample_size: usize,
    n_features: Option<usize>,
    offset: f64,
}

impl IsolationForest {
    pub fn new(
        n_estimators: usize,
        max_samples: usize,
        contamination: Contamination,
        seed: u64,
    ) -> Result<Self, ModelError> {
        if n_estimators == 0 {
            return Err(ModelError::bad_param("n_estimators", "must be >= 1"));
        }
        if max_samples < 2 {
            return Err(ModelError::bad_param("max_samples", "must be >= 2"));
        }
        Ok(Self {
            n_estimators,
            max_samples,
            contamination,
            seed,
            trees: Vec::new(),
            sample_size: 0,
            n_features: None,
            offset: AUTO_OFFSET,
        })
    }

    /// Build from a hyperparameter map.
    ///
    /// Keys: `n_estimators` (100), `max_samples` (256), `contamination`
    /// (`"auto"` or a fraction), `seed` (42).
    pub fn from_params(params: &Map<String, Value>) -> Result<Self, ModelError> {
        let params = Params::new(
            params,
            &["n_estimators", "max_samples", "contamination", "seed"],
        )?;
        Self::new(
            params.usize_or("n_estimators", 100)?,
            params.usize_or("max_samples", 256)?,
            params.contamination()?,
            params.u64_or("seed", 42)?,
        )
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Opposite of the anomaly score of the paper: `-2^(-E[h(x)] / c(ψ))`.
    ///
    /// Lies in [-1, 0); lower means more anomalous.
    pub fn score_samples(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        let n_features = self.n_features.ok_or(ModelError::NotFitted)?;
        if features.width() != n_features {
            return Err(ModelError::ShapeMismatch {
                expected: n_features,
                found: features.width(),
            });
        }

        let norm = average_path_length(self.sample_size);
        let n_trees = self.trees.len() as f64;
        Ok(features
            .rows()
            .iter()
            .map(|row| {
                let mean_depth =
                    self.trees.iter().map(|t| t.path_length(row, 0)).sum::<f64>() / n_trees;
                -(2f64.powf(-mean_depth / norm))
            })
            .collect())
    }

    /// `score_samples - offset`; negative values are outliers
    pub fn decision_function(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        Ok(self
            .score_samples(features)?
            .into_iter()
            .map(|s| s - self.offset)
            .collect())
    }
}

impl NormalityModel for IsolationForest {
    fn fit(&mut self, features: &FeatureMatrix) -> Result<(), ModelError> {
        let n = features.n_rows();
        if n < 2 {
            return Err(ModelError::InsufficientRows {
                required: 2,
                found: n,
            });
        }

        let sample_size = self.max_samples.min(n);
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let rows = features.rows();

        self.trees = (0..self.n_estimators)
            .map(|_| {
                let mut indices = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                grow(rows, &mut indices, 0, max_depth, &mut rng)
            })
            .collect();
        self.sample_size = sample_size;
        self.n_features = Some(features.width());

        self.offset = match self.contamination {
            Contamination::Auto => AUTO_OFFSET,
            Contamination::Fraction(c) => {
                let train = self.score_samples(features)?;
                percentile_of(&train, 100.0 * c)
            }
        };

        debug!(
            trees = self.trees.len(),
            sample_size,
            max_depth,
            offset = self.offset,
            "Isolation forest fitted"
        );
        Ok(())
    }

    fn normality(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        self.decision_function(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> FeatureMatrix {
        let mut rows: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let t = i as f64 * 0.1;
                vec![t.sin() * 0.5, t.cos() * 0.5]
            })
            .collect();
        rows.push(vec![8.0, -8.0]);
        FeatureMatrix::from_rows(rows).unwrap()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) ≈ 10.24
        assert!((average_path_length(256) - 10.244).abs() < 0.01);
    }

    #[test]
    fn test_outlier_is_least_normal() {
        let features = cluster_with_outlier();
        let mut forest = IsolationForest::new(100, 256, Contamination::Auto, 42).unwrap();
        forest.fit(&features).unwrap();

        let normality = forest.normality(&features).unwrap();
        let outlier = normality[60];
        assert!(
            normality[..60].iter().all(|&v| v > outlier),
            "Isolated point should have the lowest normality"
        );
        assert!(outlier < 0.0, "Outlier should fall below the decision boundary");
    }

    #[test]
    fn test_deterministic_given_seed() {
        let features = cluster_with_outlier();
        let mut a = IsolationForest::new(20, 32, Contamination::Auto, 7).unwrap();
        let mut b = IsolationForest::new(20, 32, Contamination::Auto, 7).unwrap();
        a.fit(&features).unwrap();
        b.fit(&features).unwrap();
        assert_eq!(a.normality(&features).unwrap(), b.normality(&features).unwrap());
    }

    #[test]
    fn test_constant_input_sits_on_boundary() {
        let features = FeatureMatrix::from_rows(vec![vec![0.0, 0.0]; 40]).unwrap();
        for contamination in [Contamination::Auto, Contamination::Fraction(0.1)] {
            let mut forest = IsolationForest::new(10, 256, contamination, 42).unwrap();
            forest.fit(&features).unwrap();
            let normality = forest.normality(&features).unwrap();
            assert!(normality.iter().all(|v| v.abs() < 1e-12), "{:?}", normality);
        }
    }

    #[test]
    fn test_contamination_offset_flags_fraction() {
        let features = cluster_with_outlier();
        let mut forest = IsolationForest::new(100, 256, Contamination::Fraction(0.1), 42).unwrap();
        forest.fit(&features).unwrap();
        let negatives = forest
            .normality(&features)
            .unwrap()
            .iter()
            .filter(|&&v| v < 0.0)
            .count();
        assert!((4..=8).contains(&negatives), "~10% below offset, got {}", negatives);
    }

    #[test]
    fn test_errors() {
        let forest = IsolationForest::new(10, 16, Contamination::Auto, 0).unwrap();
        let features = FeatureMatrix::from_rows(vec![vec![1.0]]).unwrap();
        assert_eq!(forest.normality(&features), Err(ModelError::NotFitted));

        let mut forest = forest;
        assert!(matches!(
            forest.fit(&features),
            Err(ModelError::InsufficientRows { .. })
        ));

        let params = serde_json::json!({"n_estimators": -1});
        assert!(IsolationForest::from_params(params.as_object().unwrap()).is_err());
    }
}
