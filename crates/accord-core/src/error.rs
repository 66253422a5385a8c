//! Error taxonomy for the reconciliation pipeline
//!
//! Configuration and input errors abort a run. Lane errors (`ScorerFitError`,
//! `ScoringFailed`) only exclude the offending lane. `DegenerateColumn` and
//! `EmptyEvaluationInput` are recovered where they occur and end up as report
//! metadata.

use thiserror::Error;

/// Result alias used throughout the core
pub type Result<T> = std::result::Result<T, AccordError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccordError {
    /// Bad window/stride/percentile/smoothing settings. Fatal.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Malformed series, ground truth or shape mismatch. Fatal.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Zero-variance feature column; recovered by the scaler.
    #[error("feature column {column} has zero variance")]
    DegenerateColumn { column: usize },

    /// A model could not be built or trained (includes lane timeouts).
    #[error("scorer '{lane}' failed to fit: {reason}")]
    ScorerFitError { lane: String, reason: String },

    /// A trained model could not produce a usable score vector.
    #[error("scorer '{lane}' failed to score: {reason}")]
    ScoringFailed { lane: String, reason: String },

    /// IoU requested with no flagged timesteps and no ground truth.
    #[error("IoU requested with no flagged timesteps and no ground truth")]
    EmptyEvaluationInput,
}

impl AccordError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True for errors that only exclude a single lane
    pub fn is_lane_error(&self) -> bool {
        matches!(self, Self::ScorerFitError { .. } | Self::ScoringFailed { .. })
    }

    /// Lane name for lane-scoped errors
    pub fn lane(&self) -> Option<&str> {
        match self {
            Self::ScorerFitError { lane, .. } | Self::ScoringFailed { lane, .. } => Some(lane),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_errors_are_scoped() {
        let fit = AccordError::ScorerFitError {
            lane: "svm".to_string(),
            reason: "did not converge".to_string(),
        };
        assert!(fit.is_lane_error());
        assert_eq!(fit.lane(), Some("svm"));

        let config = AccordError::invalid_config("window_size must be > 0");
        assert!(!config.is_lane_error());
        assert_eq!(config.lane(), None);
    }

    #[test]
    fn test_display_messages() {
        let err = AccordError::DegenerateColumn { column: 3 };
        assert_eq!(err.to_string(), "feature column 3 has zero variance");

        let err = AccordError::ScoringFailed {
            lane: "lof".to_string(),
            reason: "not fitted".to_string(),
        };
        assert_eq!(err.to_string(), "scorer 'lof' failed to score: not fitted");
    }
}
