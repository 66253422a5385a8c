//! ACCORD core: cross-model anomaly score reconciliation
//!
//! Several unsupervised scorers with incompatible score definitions run
//! over the same multivariate series. This crate puts them on a common
//! footing so their anomalous intervals can be compared:
//!
//! ```text
//! series → Windowizer → FeatureScaler → ScorerAdapter × N (parallel lanes)
//!        → TimelineReconstructor → ScoreNormalizer → Smoother
//!        → ThresholdCalibrator → IntervalEvaluator → ComparisonReport
//! ```
//!
//! Every stage is a pure transformation. Engines plug in through
//! [`scorer::NormalityModel`] or [`scorer::TransductiveModel`]; reference
//! engines live in [`algo`].

pub mod algo;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod normalize;
pub mod pipeline;
pub mod scaler;
pub mod scorer;
pub mod series;
pub mod smooth;
pub mod threshold;
pub mod timeline;
pub mod window;

pub use algo::ModelError;
pub use config::{Featurization, PipelineConfig, ScorerKind, ScorerSpec, ThresholdMode};
pub use error::{AccordError, Result};
pub use evaluate::{AgreementMatrix, IntervalEvaluator, IntervalReport};
pub use normalize::ScoreNormalizer;
pub use pipeline::{ComparisonReport, LaneCollector, LaneFailure, LaneResult, Pipeline};
pub use scaler::FeatureScaler;
pub use scorer::{NormalityModel, ScoreVector, ScorerAdapter, ScorerVariant, TransductiveModel};
pub use series::{GroundTruthInterval, MultivariateSeries};
pub use smooth::Smoother;
pub use threshold::{AnomalyFlagSeries, FlagRun, SweepPoint, ThresholdCalibrator, percentile};
pub use timeline::{ScoreSeries, TimelineReconstructor};
pub use window::{FeatureMatrix, Windowizer};
