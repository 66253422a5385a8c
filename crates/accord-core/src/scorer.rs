//! Scorer adapters
//!
//! Every engine has its own score convention. The adapters put them all
//! under one contract: `fit(features)` then `score(features)`, one finite
//! value per row, larger = more anomalous. Engines only need to implement
//! one of the two model traits below.

use crate::algo::{IsolationForest, LocalOutlierFactor, ModelError, OneClassSvm};
use crate::config::{ScorerKind, ScorerSpec};
use crate::error::{AccordError, Result};
use crate::window::FeatureMatrix;

/// One anomaly score per feature row, larger = more anomalous
pub type ScoreVector = Vec<f64>;

// ============================================================================
// Model traits
// ============================================================================

/// Engine with separate fit and inference, reporting larger = more normal
pub trait NormalityModel: Send {
    fn fit(&mut self, features: &FeatureMatrix) -> std::result::Result<(), ModelError>;

    fn normality(&self, features: &FeatureMatrix) -> std::result::Result<Vec<f64>, ModelError>;
}

/// Engine that can only score the data it is fitted on
pub trait TransductiveModel: Send {
    fn fit_normality(
        &mut self,
        features: &FeatureMatrix,
    ) -> std::result::Result<Vec<f64>, ModelError>;
}

// ============================================================================
// Variants
// ============================================================================

/// Fit state shared by the two inductive variants
struct Inductive {
    model: Box<dyn NormalityModel>,
    fitted: bool,
}

impl Inductive {
    fn fit(&mut self, features: &FeatureMatrix) -> std::result::Result<(), ModelError> {
        self.fitted = false;
        self.model.fit(features)?;
        self.fitted = true;
        Ok(())
    }

    fn negated(&self, features: &FeatureMatrix) -> std::result::Result<ScoreVector, ModelError> {
        if !self.fitted {
            return Err(ModelError::NotFitted);
        }
        Ok(self
            .model
            .normality(features)?
            .into_iter()
            .map(|v| -v)
            .collect())
    }
}

/// Isolation-style model: anomaly score is `-normality`
pub struct DensityBasedScorer(Inductive);

impl DensityBasedScorer {
    pub fn new(model: impl NormalityModel + 'static) -> Self {
        Self(Inductive {
            model: Box::new(model),
            fitted: false,
        })
    }
}

/// Boundary model whose normality is the signed distance to the boundary
/// (positive inside): anomaly score is `-distance`
pub struct MarginBasedScorer(Inductive);

impl MarginBasedScorer {
    pub fn new(model: impl NormalityModel + 'static) -> Self {
        Self(Inductive {
            model: Box::new(model),
            fitted: false,
        })
    }
}

/// Transductive model: `fit` computes and caches the scores of the fitted
/// matrix; `score` replays them for that same matrix only
pub struct LocalDensityScorer {
    model: Box<dyn TransductiveModel>,
    /// Fingerprint of the fitted matrix and its normality values
    cache: Option<(u64, Vec<f64>)>,
}

impl LocalDensityScorer {
    pub fn new(model: impl TransductiveModel + 'static) -> Self {
        Self {
            model: Box::new(model),
            cache: None,
        }
    }

    fn fit(&mut self, features: &FeatureMatrix) -> std::result::Result<(), ModelError> {
        self.cache = None;
        let normality = self.model.fit_normality(features)?;
        self.cache = Some((features.fingerprint(), normality));
        Ok(())
    }

    fn score(&self, features: &FeatureMatrix) -> std::result::Result<ScoreVector, ModelError> {
        let (fingerprint, normality) = self.cache.as_ref().ok_or(ModelError::NotFitted)?;
        if *fingerprint != features.fingerprint() {
            return Err(ModelError::UnseenData);
        }
        Ok(normality.iter().map(|v| -v).collect())
    }
}

/// Scoring strategy, chosen once at configuration time
pub enum ScorerVariant {
    Density(DensityBasedScorer),
    Margin(MarginBasedScorer),
    LocalDensity(LocalDensityScorer),
}

// ============================================================================
// Adapter
// ============================================================================

/// Named scorer lane with a uniform score contract
pub struct ScorerAdapter {
    name: String,
    variant: ScorerVariant,
}

impl ScorerAdapter {
    pub fn new(name: impl Into<String>, variant: ScorerVariant) -> Self {
        Self {
            name: name.into(),
            variant,
        }
    }

    pub fn density(name: impl Into<String>, model: impl NormalityModel + 'static) -> Self {
        Self::new(name, ScorerVariant::Density(DensityBasedScorer::new(model)))
    }

    pub fn margin(name: impl Into<String>, model: impl NormalityModel + 'static) -> Self {
        Self::new(name, ScorerVariant::Margin(MarginBasedScorer::new(model)))
    }

    pub fn local_density(name: impl Into<String>, model: impl TransductiveModel + 'static) -> Self {
        Self::new(
            name,
            ScorerVariant::LocalDensity(LocalDensityScorer::new(model)),
        )
    }

    /// Build the reference engine for `spec.kind` from its hyperparameters.
    ///
    /// A bad hyperparameter is a failure of this lane only.
    pub fn from_spec(spec: &ScorerSpec) -> Result<Self> {
        let fit_error = |e: ModelError| AccordError::ScorerFitError {
            lane: spec.name.clone(),
            reason: e.to_string(),
        };

        Ok(match spec.kind {
            ScorerKind::Density => Self::density(
                &spec.name,
                IsolationForest::from_params(&spec.params).map_err(fit_error)?,
            ),
            ScorerKind::Margin => Self::margin(
                &spec.name,
                OneClassSvm::from_params(&spec.params).map_err(fit_error)?,
            ),
            ScorerKind::LocalDensity => Self::local_density(
                &spec.name,
                LocalOutlierFactor::from_params(&spec.params).map_err(fit_error)?,
            ),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ScorerKind {
        match self.variant {
            ScorerVariant::Density(_) => ScorerKind::Density,
            ScorerVariant::Margin(_) => ScorerKind::Margin,
            ScorerVariant::LocalDensity(_) => ScorerKind::LocalDensity,
        }
    }

    pub fn fit(&mut self, features: &FeatureMatrix) -> Result<()> {
        let result = match &mut self.variant {
            ScorerVariant::Density(scorer) => scorer.0.fit(features),
            ScorerVariant::Margin(scorer) => scorer.0.fit(features),
            ScorerVariant::LocalDensity(scorer) => scorer.fit(features),
        };
        result.map_err(|e| AccordError::ScorerFitError {
            lane: self.name.clone(),
            reason: e.to_string(),
        })
    }

    /// One finite score per row of `features`, larger = more anomalous
    pub fn score(&self, features: &FeatureMatrix) -> Result<ScoreVector> {
        let scores = match &self.variant {
            ScorerVariant::Density(scorer) => scorer.0.negated(features),
            ScorerVariant::Margin(scorer) => scorer.0.negated(features),
            ScorerVariant::LocalDensity(scorer) => scorer.score(features),
        }
        .map_err(|e| self.scoring_failed(e.to_string()))?;

        if scores.len() != features.n_rows() {
            return Err(self.scoring_failed(format!(
                "engine returned {} scores for {} rows",
                scores.len(),
                features.n_rows()
            )));
        }
        if let Some(i) = scores.iter().position(|s| !s.is_finite()) {
            return Err(self.scoring_failed(format!("non-finite score at row {}", i)));
        }
        Ok(scores)
    }

    fn scoring_failed(&self, reason: String) -> AccordError {
        AccordError::ScoringFailed {
            lane: self.name.clone(),
            reason,
        }
    }
}

impl std::fmt::Debug for ScorerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScorerAdapter")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScorerSpec;
    use serde_json::json;

    /// Returns the first feature of each row as normality
    struct FirstColumn;

    impl NormalityModel for FirstColumn {
        fn fit(&mut self, _: &FeatureMatrix) -> std::result::Result<(), ModelError> {
            Ok(())
        }

        fn normality(&self, f: &FeatureMatrix) -> std::result::Result<Vec<f64>, ModelError> {
            Ok(f.column(0))
        }
    }

    /// Transductive stub counting how often it is fitted
    struct Counting {
        calls: usize,
    }

    impl TransductiveModel for Counting {
        fn fit_normality(
            &mut self,
            f: &FeatureMatrix,
        ) -> std::result::Result<Vec<f64>, ModelError> {
            self.calls += 1;
            Ok(f.column(0))
        }
    }

    struct Broken(Vec<f64>);

    impl NormalityModel for Broken {
        fn fit(&mut self, _: &FeatureMatrix) -> std::result::Result<(), ModelError> {
            Ok(())
        }

        fn normality(&self, _: &FeatureMatrix) -> std::result::Result<Vec<f64>, ModelError> {
            Ok(self.0.clone())
        }
    }

    struct NeverConverges;

    impl NormalityModel for NeverConverges {
        fn fit(&mut self, _: &FeatureMatrix) -> std::result::Result<(), ModelError> {
            Err(ModelError::NotConverged { iterations: 10 })
        }

        fn normality(&self, _: &FeatureMatrix) -> std::result::Result<Vec<f64>, ModelError> {
            Ok(Vec::new())
        }
    }

    fn features() -> FeatureMatrix {
        FeatureMatrix::from_rows(vec![vec![1.0, 0.0], vec![-2.0, 0.0], vec![0.5, 0.0]]).unwrap()
    }

    #[test]
    fn test_density_and_margin_negate_normality() {
        let f = features();
        for mut adapter in [
            ScorerAdapter::density("d", FirstColumn),
            ScorerAdapter::margin("m", FirstColumn),
        ] {
            adapter.fit(&f).unwrap();
            assert_eq!(adapter.score(&f).unwrap(), vec![-1.0, 2.0, -0.5]);
        }
    }

    #[test]
    fn test_score_before_fit_fails() {
        let adapter = ScorerAdapter::density("d", FirstColumn);
        let err = adapter.score(&features()).unwrap_err();
        assert!(matches!(err, AccordError::ScoringFailed { ref lane, .. } if lane == "d"));

        let adapter = ScorerAdapter::local_density("l", Counting { calls: 0 });
        assert!(adapter.score(&features()).is_err());
    }

    #[test]
    fn test_local_density_replays_cache() {
        let f = features();
        let mut adapter = ScorerAdapter::local_density("lof", Counting { calls: 0 });
        adapter.fit(&f).unwrap();

        assert_eq!(adapter.score(&f).unwrap(), vec![-1.0, 2.0, -0.5]);
        assert_eq!(adapter.score(&f).unwrap(), vec![-1.0, 2.0, -0.5]);

        let other = FeatureMatrix::from_rows(vec![vec![9.0, 0.0]]).unwrap();
        let err = adapter.score(&other).unwrap_err();
        assert!(matches!(err, AccordError::ScoringFailed { .. }));
        assert_eq!(adapter.kind(), ScorerKind::LocalDensity);
    }

    #[test]
    fn test_contract_violations() {
        let f = features();

        let mut short = ScorerAdapter::density("short", Broken(vec![0.0]));
        short.fit(&f).unwrap();
        assert!(short.score(&f).is_err(), "Row-count mismatch must fail");

        let mut nan = ScorerAdapter::margin("nan", Broken(vec![0.0, f64::NAN, 0.0]));
        nan.fit(&f).unwrap();
        assert!(nan.score(&f).is_err(), "Non-finite scores must fail");
    }

    #[test]
    fn test_not_converged_is_fit_error() {
        let mut adapter = ScorerAdapter::margin("svm", NeverConverges);
        let err = adapter.fit(&features()).unwrap_err();
        assert!(matches!(err, AccordError::ScorerFitError { ref lane, .. } if lane == "svm"));
    }

    #[test]
    fn test_from_spec() {
        let spec = ScorerSpec::new("iso", ScorerKind::Density).with_param("seed", json!(1));
        let adapter = ScorerAdapter::from_spec(&spec).unwrap();
        assert_eq!(adapter.name(), "iso");
        assert_eq!(adapter.kind(), ScorerKind::Density);

        let bad = ScorerSpec::new("svm", ScorerKind::Margin).with_param("nu", json!("abc"));
        let err = ScorerAdapter::from_spec(&bad).unwrap_err();
        assert!(err.to_string().contains("svm"));
        assert_eq!(err.lane(), Some("svm"));
    }
}
