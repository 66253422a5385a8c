//! Pipeline Configuration
//!
//! Every option has a default matching the stock three-model comparison:
//! window of 10 flattened samples, 5-wide smoothing, 95th percentile cut,
//! isolation forest / one-class SVM / LOF lanes. Scorer hyperparameters are
//! opaque to the core and handed to the engine untouched.

use crate::error::{AccordError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::path::Path;

/// How a window becomes a feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Featurization {
    /// Concatenate every sample of the window (`W × channels` features)
    #[default]
    Flatten,
    /// Mean, std, min, max per channel (`4 × channels` features)
    Summary,
}

/// Whether lanes share one threshold or compute their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Each lane cuts its own distribution; equalizes the flagged rate
    #[default]
    PerLane,
    /// One cut over the pooled normalized scores of all lanes
    Shared,
}

/// Model family behind a lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    /// Random-partition isolation model
    #[serde(alias = "isolation_forest")]
    Density,
    /// One-class boundary model
    #[serde(alias = "one_class_svm")]
    Margin,
    /// Local density ratio model (combined fit-and-score only)
    #[serde(alias = "lof")]
    LocalDensity,
}

impl ScorerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Density => "density",
            Self::Margin => "margin",
            Self::LocalDensity => "local_density",
        }
    }
}

/// One scorer lane: a display name, a model family, and its hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerSpec {
    pub name: String,
    pub kind: ScorerKind,
    /// Passed through to the engine; the core never interprets these
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ScorerSpec {
    pub fn new(name: impl Into<String>, kind: ScorerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }
}

/// Run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub window_size: usize,
    pub stride: usize,
    pub featurization: Featurization,
    /// Odd moving-average width
    pub smoothing_width: usize,
    /// Percentile in [0, 100]
    pub threshold_percentile: f64,
    pub threshold_mode: ThresholdMode,
    /// Flagged runs shorter than this are dropped (1 = keep everything)
    pub min_run_length: usize,
    /// Lane deadline; `None` waits for every lane
    pub lane_timeout_ms: Option<u64>,
    pub scorers: Vec<ScorerSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            stride: 1,
            featurization: Featurization::Flatten,
            smoothing_width: 5,
            threshold_percentile: 95.0,
            threshold_mode: ThresholdMode::PerLane,
            min_run_length: 1,
            lane_timeout_ms: Some(60_000),
            scorers: default_scorers(),
        }
    }
}

/// Isolation forest, one-class SVM and LOF lanes
pub fn default_scorers() -> Vec<ScorerSpec> {
    vec![
        ScorerSpec::new("IsolationForest", ScorerKind::Density)
            .with_param("contamination", json!(0.1))
            .with_param("seed", json!(42)),
        ScorerSpec::new("OneClassSVM", ScorerKind::Margin)
            .with_param("nu", json!(0.1))
            .with_param("gamma", json!("auto")),
        ScorerSpec::new("LOF", ScorerKind::LocalDensity)
            .with_param("n_neighbors", json!(20))
            .with_param("contamination", json!(0.1)),
    ]
}

impl PipelineConfig {
    /// Parse from JSON; missing fields fall back to defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| AccordError::invalid_config(format!("config JSON: {}", e)))
    }

    /// Read and parse a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AccordError::invalid_config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Check everything that can be checked without the series
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(AccordError::invalid_config("window_size must be > 0"));
        }
        if self.stride == 0 {
            return Err(AccordError::invalid_config("stride must be >= 1"));
        }
        if self.featurization == Featurization::Flatten && self.stride != 1 {
            return Err(AccordError::invalid_config(format!(
                "flatten featurization requires stride 1, got {}",
                self.stride
            )));
        }
        if self.smoothing_width == 0 || self.smoothing_width % 2 == 0 {
            return Err(AccordError::invalid_config(format!(
                "smoothing_width must be an odd integer >= 1, got {}",
                self.smoothing_width
            )));
        }
        if !self.threshold_percentile.is_finite()
            || !(0.0..=100.0).contains(&self.threshold_percentile)
        {
            return Err(AccordError::invalid_config(format!(
                "threshold_percentile must be in [0, 100], got {}",
                self.threshold_percentile
            )));
        }
        if self.min_run_length == 0 {
            return Err(AccordError::invalid_config("min_run_length must be >= 1"));
        }
        if self.lane_timeout_ms == Some(0) {
            return Err(AccordError::invalid_config("lane_timeout_ms must be > 0"));
        }
        if self.scorers.is_empty() {
            return Err(AccordError::invalid_config("at least one scorer is required"));
        }

        let mut names = HashSet::new();
        for spec in &self.scorers {
            if spec.name.trim().is_empty() {
                return Err(AccordError::invalid_config("scorer names must not be empty"));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(AccordError::invalid_config(format!(
                    "duplicate scorer name '{}'",
                    spec.name
                )));
            }
        }

        Ok(())
    }

    /// Checks that depend on the series length
    pub fn validate_for_len(&self, series_len: usize) -> Result<()> {
        self.validate()?;
        if self.window_size > series_len {
            return Err(AccordError::invalid_config(format!(
                "window_size {} exceeds series length {}",
                self.window_size, series_len
            )));
        }
        Ok(())
    }

    /// Stable xxh3 fingerprint of the serialized configuration
    pub fn fingerprint(&self) -> u64 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        xxhash_rust::xxh3::xxh3_64(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scorers.len(), 3);
        assert_eq!(config.scorers[2].kind, ScorerKind::LocalDensity);
    }

    #[test]
    fn test_rejects_bad_settings() {
        let bad = [
            PipelineConfig {
                window_size: 0,
                ..Default::default()
            },
            PipelineConfig {
                stride: 2,
                ..Default::default()
            },
            PipelineConfig {
                smoothing_width: 4,
                ..Default::default()
            },
            PipelineConfig {
                threshold_percentile: 101.0,
                ..Default::default()
            },
            PipelineConfig {
                threshold_percentile: f64::NAN,
                ..Default::default()
            },
            PipelineConfig {
                scorers: Vec::new(),
                ..Default::default()
            },
        ];

        for config in &bad {
            assert!(
                matches!(config.validate(), Err(AccordError::InvalidConfiguration(_))),
                "Expected rejection for {:?}",
                config
            );
        }
    }

    #[test]
    fn test_strided_summary_is_valid() {
        let config = PipelineConfig {
            featurization: Featurization::Summary,
            stride: 10,
            window_size: 30,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.validate_for_len(29).is_err());
        assert!(config.validate_for_len(30).is_ok());
    }

    #[test]
    fn test_duplicate_scorer_names() {
        let mut config = PipelineConfig::default();
        config.scorers[1].name = config.scorers[0].name.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{"window_size": 20, "threshold_mode": "shared",
                "scorers": [{"name": "iso", "kind": "isolation_forest"}]}"#,
        )
        .unwrap();
        assert_eq!(config.window_size, 20);
        assert_eq!(config.smoothing_width, 5);
        assert_eq!(config.threshold_mode, ThresholdMode::Shared);
        assert_eq!(config.scorers[0].kind, ScorerKind::Density);
        assert!(config.scorers[0].params.is_empty());

        assert!(PipelineConfig::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_fingerprint_tracks_changes() {
        let a = PipelineConfig::default();
        let mut b = PipelineConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.threshold_percentile = 90.0;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
