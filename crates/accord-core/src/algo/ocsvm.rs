//! One-Class SVM (Schölkopf et al.)
//!
//! Separates the training data from the origin in RBF feature space. The
//! dual
//!
//! ```text
//! min ½ αᵀQα   s.t. 0 ≤ αᵢ ≤ 1,  Σαᵢ = νl
//! ```
//!
//! is solved with SMO on the maximal violating pair. The decision value
//! `Σαᵢ K(xᵢ, x) - ρ` is positive inside the learned boundary.

use super::{ModelError, Params, squared_distance};
use crate::scorer::NormalityModel;
use crate::window::FeatureMatrix;
use serde_json::{Map, Value};
use tracing::debug;

/// Smallest curvature used for a working pair (guards identical rows)
const TAU: f64 = 1e-12;

/// RBF kernel width
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gamma {
    /// `1 / n_features`
    Auto,
    /// `1 / (n_features × Var(X))`
    Scale,
    Value(f64),
}

impl Gamma {
    fn from_value(value: Option<&Value>) -> Result<Self, ModelError> {
        match value {
            None => Ok(Self::Auto),
            Some(Value::String(s)) if s == "auto" => Ok(Self::Auto),
            Some(Value::String(s)) if s == "scale" => Ok(Self::Scale),
            Some(v) => match v.as_f64() {
                Some(g) if g > 0.0 && g.is_finite() => Ok(Self::Value(g)),
                _ => Err(ModelError::bad_param(
                    "gamma",
                    format!("expected \"auto\", \"scale\" or a positive number, got {}", v),
                )),
            },
        }
    }

    fn resolve(&self, features: &FeatureMatrix) -> f64 {
        let width = features.width().max(1) as f64;
        match self {
            Self::Auto => 1.0 / width,
            Self::Scale => {
                let count = (features.n_rows() * features.width()) as f64;
                let mean = features.rows().iter().flatten().sum::<f64>() / count;
                let var = features
                    .rows()
                    .iter()
                    .flatten()
                    .map(|x| (x - mean).powi(2))
                    .sum::<f64>()
                    / count;
                if var > 0.0 { 1.0 / (width * var) } else { 1.0 }
            }
            Self::Value(g) => *g,
        }
    }
}

/// One-class SVM with an RBF kernel
#[derive(Debug, Clone)]
pub struct OneClassSvm {
    nu: f64,
    gamma: Gamma,
    tol: f64,
    max_iter: usize,

    support: Vec<Vec<f64>>,
    coef: Vec<f64>,
    rho: f64,
    fitted_gamma: f64,
    n_features: Option<usize>,
}

impl OneClassSvm {
    pub fn new(nu: f64, gamma: Gamma, tol: f64, max_iter: usize) -> Result<Self, ModelError> {
        if !(nu > 0.0 && nu <= 1.0) {
            return Err(ModelError::bad_param("nu", format!("must be in (0, 1], got {}", nu)));
        }
        if !(tol > 0.0) {
            return Err(ModelError::bad_param("tol", "must be > 0"));
        }
        if max_iter == 0 {
            return Err(ModelError::bad_param("max_iter", "must be >= 1"));
        }
        Ok(Self {
            nu,
            gamma,
            tol,
            max_iter,
            support: Vec::new(),
            coef: Vec::new(),
            rho: 0.0,
            fitted_gamma: 0.0,
            n_features: None,
        })
    }

    /// Keys: `nu` (0.5), `gamma` (`"auto"`), `tol` (1e-3), `max_iter` (100000)
    pub fn from_params(params: &Map<String, Value>) -> Result<Self, ModelError> {
        let params = Params::new(params, &["nu", "gamma", "tol", "max_iter"])?;
        Self::new(
            params.f64_or("nu", 0.5)?,
            Gamma::from_value(params.get("gamma"))?,
            params.f64_or("tol", 1e-3)?,
            params.usize_or("max_iter", 100_000)?,
        )
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn support_count(&self) -> usize {
        self.support.len()
    }

    fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        (-self.fitted_gamma * squared_distance(a, b)).exp()
    }

    /// Signed distance to the boundary; positive inside
    pub fn decision_function(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        let n_features = self.n_features.ok_or(ModelError::NotFitted)?;
        if features.width() != n_features {
            return Err(ModelError::ShapeMismatch {
                expected: n_features,
                found: features.width(),
            });
        }

        Ok(features
            .rows()
            .iter()
            .map(|x| {
                self.support
                    .iter()
                    .zip(&self.coef)
                    .map(|(sv, a)| a * self.kernel(sv, x))
                    .sum::<f64>()
                    - self.rho
            })
            .collect())
    }
}

/// Dense SMO state for the one-class dual
struct Solver {
    q: Vec<Vec<f64>>,
    alpha: Vec<f64>,
    /// Gradient `Qα`
    grad: Vec<f64>,
}

impl Solver {
    fn new(q: Vec<Vec<f64>>, nu: f64) -> Self {
        let l = q.len();

        // Feasible start: first ⌊νl⌋ at the bound, the remainder on the next one
        let total = nu * l as f64;
        let whole = (total.floor() as usize).min(l);
        let mut alpha = vec![0.0; l];
        for a in alpha.iter_mut().take(whole) {
            *a = 1.0;
        }
        if whole < l {
            alpha[whole] = total - whole as f64;
        }

        let grad = q
            .iter()
            .map(|row| row.iter().zip(&alpha).map(|(k, a)| k * a).sum())
            .collect();

        Self { q, alpha, grad }
    }

    /// Maximal violating pair `(i, j, gap)`: `i` may grow, `j` may shrink
    fn working_pair(&self) -> Option<(usize, usize, f64)> {
        let mut up: Option<(usize, f64)> = None;
        let mut low: Option<(usize, f64)> = None;
        for (t, (&a, &g)) in self.alpha.iter().zip(&self.grad).enumerate() {
            if a < 1.0 && up.is_none_or(|(_, best)| -g > best) {
                up = Some((t, -g));
            }
            if a > 0.0 && low.is_none_or(|(_, best)| -g < best) {
                low = Some((t, -g));
            }
        }
        match (up, low) {
            (Some((i, m)), Some((j, big_m))) => Some((i, j, m - big_m)),
            _ => None,
        }
    }

    fn step(&mut self, i: usize, j: usize) {
        let quad = (self.q[i][i] + self.q[j][j] - 2.0 * self.q[i][j]).max(TAU);
        let delta = (self.grad[i] - self.grad[j]) / quad;

        let (old_i, old_j) = (self.alpha[i], self.alpha[j]);
        let sum = old_i + old_j;
        let mut ai = old_i - delta;
        let mut aj = old_j + delta;

        // Clip to the box while keeping ai + aj = sum
        if sum > 1.0 {
            if ai > 1.0 {
                ai = 1.0;
                aj = sum - 1.0;
            }
        } else if aj < 0.0 {
            aj = 0.0;
            ai = sum;
        }
        if sum > 1.0 {
            if aj > 1.0 {
                aj = 1.0;
                ai = sum - 1.0;
            }
        } else if ai < 0.0 {
            ai = 0.0;
            aj = sum;
        }

        self.alpha[i] = ai;
        self.alpha[j] = aj;
        let (di, dj) = (ai - old_i, aj - old_j);
        for (k, g) in self.grad.iter_mut().enumerate() {
            *g += self.q[k][i] * di + self.q[k][j] * dj;
        }
    }

    /// Offset from the free multipliers, or the midpoint of the bounds
    fn rho(&self) -> f64 {
        let (mut ub, mut lb) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut free, mut free_sum) = (0usize, 0.0);
        for (&a, &g) in self.alpha.iter().zip(&self.grad) {
            if a >= 1.0 {
                lb = lb.max(g);
            } else if a <= 0.0 {
                ub = ub.min(g);
            } else {
                free += 1;
                free_sum += g;
            }
        }
        if free > 0 {
            free_sum / free as f64
        } else if ub.is_infinite() {
            // ν = 1: every multiplier at the bound
            lb
        } else {
            (ub + lb) / 2.0
        }
    }
}

impl NormalityModel for OneClassSvm {
    fn fit(&mut self, features: &FeatureMatrix) -> Result<(), ModelError> {
        let l = features.n_rows();
        if l == 0 {
            return Err(ModelError::InsufficientRows {
                required: 1,
                found: 0,
            });
        }

        self.fitted_gamma = self.gamma.resolve(features);
        let rows = features.rows();
        let q: Vec<Vec<f64>> = rows
            .iter()
            .map(|a| rows.iter().map(|b| self.kernel(a, b)).collect())
            .collect();

        let mut solver = Solver::new(q, self.nu);
        let mut iterations = 0;
        while let Some((i, j, gap)) = solver.working_pair() {
            if gap < self.tol {
                break;
            }
            if iterations >= self.max_iter {
                return Err(ModelError::NotConverged {
                    iterations: self.max_iter,
                });
            }
            solver.step(i, j);
            iterations += 1;
        }

        self.rho = solver.rho();
        let (support, coef): (Vec<_>, Vec<_>) = solver
            .alpha
            .iter()
            .enumerate()
            .filter(|(_, a)| **a > 0.0)
            .map(|(t, &a)| (rows[t].clone(), a))
            .unzip();
        self.support = support;
        self.coef = coef;
        self.n_features = Some(features.width());

        debug!(
            iterations,
            support_vectors = self.support.len(),
            rho = self.rho,
            gamma = self.fitted_gamma,
            "One-class SVM fitted"
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

    fn ring_with_outlier() -> FeatureMatrix {
        let mut rows: Vec<Vec<f64>> = (0..50)
            .map(|i| {
                let t = i as f64 * 0.125;
                vec![t.cos(), t.sin()]
            })
            .collect();
        rows.push(vec![6.0, 6.0]);
        FeatureMatrix::from_rows(rows).unwrap()
    }

    #[test]
    fn test_outlier_outside_boundary() {
        let features = ring_with_outlier();
        let mut svm = OneClassSvm::new(0.1, Gamma::Value(0.5), 1e-3, 100_000).unwrap();
        svm.fit(&features).unwrap();

        let decision = svm.decision_function(&features).unwrap();
        let outlier = decision[50];
        assert!(outlier < 0.0, "Far point should lie outside, got {}", outlier);
        assert!(
            decision[..50].iter().all(|&d| d > outlier),
            "Every ring point should be more normal than the outlier"
        );
        assert!(svm.support_count() > 0);
    }

    #[test]
    fn test_nu_bounds_outlier_fraction() {
        let features = ring_with_outlier();
        let mut svm = OneClassSvm::new(0.2, Gamma::Auto, 1e-4, 100_000).unwrap();
        svm.fit(&features).unwrap();

        let outside = svm
            .decision_function(&features)
            .unwrap()
            .iter()
            .filter(|&&d| d < -1e-3)
            .count();
        // ν upper-bounds the fraction of margin errors
        assert!(outside as f64 <= 0.2 * 51.0 + 1.0, "{} outside", outside);
    }

    #[test]
    fn test_constant_input_sits_on_boundary() {
        let features = FeatureMatrix::from_rows(vec![vec![0.0; 3]; 37]).unwrap();
        let mut svm = OneClassSvm::new(0.1, Gamma::Auto, 1e-3, 100).unwrap();
        svm.fit(&features).unwrap();
        let decision = svm.decision_function(&features).unwrap();
        assert!(decision.iter().all(|d| d.abs() < 1e-9), "{:?}", decision);
    }

    #[test]
    fn test_not_converged() {
        let features = ring_with_outlier();
        let mut svm = OneClassSvm::new(0.1, Gamma::Value(0.5), 1e-9, 1).unwrap();
        assert_eq!(
            svm.fit(&features),
            Err(ModelError::NotConverged { iterations: 1 })
        );
    }

    #[test]
    fn test_param_validation() {
        let bad_gamma = serde_json::json!({"gamma": "wide"});
        assert!(OneClassSvm::from_params(bad_gamma.as_object().unwrap()).is_err());

        let bad_nu = serde_json::json!({"nu": 1.5});
        assert!(matches!(
            OneClassSvm::from_params(bad_nu.as_object().unwrap()),
            Err(ModelError::InvalidHyperparameter { .. })
        ));

        let ok = serde_json::json!({"nu": 0.1, "gamma": "scale"});
        assert!(OneClassSvm::from_params(ok.as_object().unwrap()).is_ok());
    }
}
