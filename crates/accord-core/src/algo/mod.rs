//! Reference scoring engines
//!
//! The pipeline only talks to these through `NormalityModel` /
//! `TransductiveModel`; any engine implementing those traits can replace
//! them. Each engine reports its native convention (larger = more normal)
//! and leaves polarity to the adapters.

pub mod iforest;
pub mod lof;
pub mod ocsvm;

pub use iforest::IsolationForest;
pub use lof::LocalOutlierFactor;
pub use ocsvm::{Gamma, OneClassSvm};

pub(crate) use crate::threshold::percentile_of;

use serde_json::{Map, Value};
use thiserror::Error;

/// Failure inside an engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid hyperparameter '{name}': {reason}")]
    InvalidHyperparameter { name: String, reason: String },

    #[error("did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("need at least {required} rows, got {found}")]
    InsufficientRows { required: usize, found: usize },

    #[error("expected {expected} features, got {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("model has not been fitted")]
    NotFitted,

    #[error("model can only score the matrix it was fitted on")]
    UnseenData,
}

impl ModelError {
    pub(crate) fn bad_param(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidHyperparameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// How much of the training data the offset assumes to be anomalous
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contamination {
    /// Engine-specific fixed offset
    Auto,
    /// Fraction in (0, 0.5]
    Fraction(f64),
}

/// Typed reads from an opaque hyperparameter map.
///
/// Unknown keys are rejected so a typo fails the lane instead of silently
/// running with defaults.
pub(crate) struct Params<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    pub(crate) fn new(map: &'a Map<String, Value>, known: &[&str]) -> Result<Self, ModelError> {
        if let Some(key) = map.keys().find(|k| !known.contains(&k.as_str())) {
            return Err(ModelError::bad_param(
                key,
                format!("unknown key (expected one of {:?})", known),
            ));
        }
        Ok(Self { map })
    }

    pub(crate) fn f64_or(&self, name: &str, default: f64) -> Result<f64, ModelError> {
        match self.map.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ModelError::bad_param(name, format!("expected a number, got {}", value))),
        }
    }

    pub(crate) fn usize_or(&self, name: &str, default: usize) -> Result<usize, ModelError> {
        match self.map.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_u64()
                .map(|v| v as usize)
                .ok_or_else(|| {
                    ModelError::bad_param(name, format!("expected a non-negative integer, got {}", value))
                }),
        }
    }

    pub(crate) fn u64_or(&self, name: &str, default: u64) -> Result<u64, ModelError> {
        match self.map.get(name) {
            None => Ok(default),
            Some(value) => value.as_u64().ok_or_else(|| {
                ModelError::bad_param(name, format!("expected a non-negative integer, got {}", value))
            }),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&'a Value> {
        self.map.get(name)
    }

    /// `"auto"` or a fraction in (0, 0.5]
    pub(crate) fn contamination(&self) -> Result<Contamination, ModelError> {
        match self.map.get("contamination") {
            None => Ok(Contamination::Auto),
            Some(Value::String(s)) if s == "auto" => Ok(Contamination::Auto),
            Some(value) => match value.as_f64() {
                Some(c) if c > 0.0 && c <= 0.5 => Ok(Contamination::Fraction(c)),
                _ => Err(ModelError::bad_param(
                    "contamination",
                    format!("expected \"auto\" or a fraction in (0, 0.5], got {}", value),
                )),
            },
        }
    }
}

/// Squared Euclidean distance
pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
