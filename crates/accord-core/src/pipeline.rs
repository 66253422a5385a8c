//! Lane runner
//!
//! One run: windowize → scale → fit/score every lane on its own thread →
//! collect over a channel until all lanes report or the deadline passes →
//! reconstruct, normalize, smooth, threshold and evaluate the survivors.
//!
//! A lane that fails (bad hyperparameters, no convergence, bad scores,
//! deadline) is excluded and recorded; it never fails the run.

use crate::config::{PipelineConfig, ScorerKind, ThresholdMode};
use crate::error::{AccordError, Result};
use crate::evaluate::{AgreementMatrix, IntervalEvaluator, IntervalReport, check_bounds};
use crate::normalize::ScoreNormalizer;
use crate::scaler::FeatureScaler;
use crate::scorer::{ScoreVector, ScorerAdapter};
use crate::series::{GroundTruthInterval, MultivariateSeries};
use crate::smooth::Smoother;
use crate::threshold::{AnomalyFlagSeries, FlagRun, ThresholdCalibrator};
use crate::timeline::{ScoreSeries, TimelineReconstructor};
use crate::window::{FeatureMatrix, Windowizer};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// Report types
// ============================================================================

/// Everything one surviving lane produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneResult {
    pub name: String,
    pub kind: ScorerKind,
    /// Wall time of fit + score
    pub elapsed_ms: u64,
    /// One score per feature row, larger = more anomalous
    pub raw_scores: ScoreVector,
    pub score_series: ScoreSeries,
    pub normalized: Vec<f64>,
    pub smoothed: Vec<f64>,
    pub threshold: f64,
    pub flags: AnomalyFlagSeries,
    pub detected_intervals: Vec<FlagRun>,
    pub iou: f64,
    /// Present when ground truth was supplied
    pub interval_report: Option<IntervalReport>,
    /// Recovered conditions worth knowing about
    pub notes: Vec<String>,
}

/// An excluded lane and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneFailure {
    pub lane: String,
    pub kind: ScorerKind,
    pub error: String,
}

impl LaneFailure {
    fn new(kind: ScorerKind, error: &AccordError, lane: &str) -> Self {
        Self {
            lane: error.lane().unwrap_or(lane).to_string(),
            kind,
            error: error.to_string(),
        }
    }
}

/// Output of one comparison run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// xxh3 of the serialized configuration, hex
    pub config_fingerprint: String,
    pub series_len: usize,
    pub feature_rows: usize,
    /// Zero-variance feature columns, left at zero after scaling
    pub degenerate_features: Vec<String>,
    pub threshold_mode: ThresholdMode,
    /// The pooled threshold in shared mode
    pub shared_threshold: Option<f64>,
    pub truth: Vec<GroundTruthInterval>,
    /// Surviving lanes, in configuration order
    pub lanes: Vec<LaneResult>,
    pub failures: Vec<LaneFailure>,
    pub agreement: AgreementMatrix,
}

impl ComparisonReport {
    pub fn lane(&self, name: &str) -> Option<&LaneResult> {
        self.lanes.iter().find(|l| l.name == name)
    }

    pub fn failure(&self, name: &str) -> Option<&LaneFailure> {
        self.failures.iter().find(|f| f.lane == name)
    }
}

// ============================================================================
// Lane collection
// ============================================================================

/// Message a lane thread sends when it is done
struct LaneOutcome {
    index: usize,
    result: Result<ScoreVector>,
    elapsed_ms: u64,
}

enum LaneState {
    Pending,
    Scored { scores: ScoreVector, elapsed_ms: u64 },
    Failed(LaneFailure),
}

/// Per-run aggregation of lane outcomes, indexed by configuration order
pub struct LaneCollector {
    names: Vec<String>,
    kinds: Vec<ScorerKind>,
    states: Vec<LaneState>,
}

impl LaneCollector {
    fn new(lanes: &[(String, ScorerKind)]) -> Self {
        Self {
            names: lanes.iter().map(|(n, _)| n.clone()).collect(),
            kinds: lanes.iter().map(|(_, k)| *k).collect(),
            states: lanes.iter().map(|_| LaneState::Pending).collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.states.iter().any(|s| matches!(s, LaneState::Pending))
    }

    /// Names of lanes that have not reported yet
    pub fn pending(&self) -> Vec<&str> {
        self.states
            .iter()
            .zip(&self.names)
            .filter(|(s, _)| matches!(s, LaneState::Pending))
            .map(|(_, n)| n.as_str())
            .collect()
    }

    fn succeed(&mut self, index: usize, scores: ScoreVector, elapsed_ms: u64) {
        self.states[index] = LaneState::Scored { scores, elapsed_ms };
    }

    fn fail(&mut self, index: usize, error: &AccordError) {
        warn!(lane = %self.names[index], error = %error, "Lane excluded");
        self.states[index] =
            LaneState::Failed(LaneFailure::new(self.kinds[index], error, &self.names[index]));
    }

    /// Fail every lane still pending with a fit error carrying `reason`
    fn fail_pending(&mut self, reason: &str) {
        for index in 0..self.states.len() {
            if matches!(self.states[index], LaneState::Pending) {
                let error = AccordError::ScorerFitError {
                    lane: self.names[index].clone(),
                    reason: reason.to_string(),
                };
                self.fail(index, &error);
            }
        }
    }
}

/// Completion handler: fold one lane's outcome into the collector
fn on_lane_complete(collector: &mut LaneCollector, outcome: LaneOutcome) {
    match outcome.result {
        Ok(scores) => {
            info!(
                lane = %collector.names[outcome.index],
                rows = scores.len(),
                elapsed_ms = outcome.elapsed_ms,
                "Lane scored"
            );
            collector.succeed(outcome.index, scores, outcome.elapsed_ms);
        }
        Err(e) => collector.fail(outcome.index, &e),
    }
}

/// Drain lane outcomes until every lane reported, the deadline passed, or
/// every lane thread is gone
fn collect_lanes(
    collector: &mut LaneCollector,
    rx: &Receiver<LaneOutcome>,
    timeout: Option<Duration>,
) {
    let deadline = timeout.map(|t| Instant::now() + t);

    while !collector.is_complete() {
        let received = match deadline {
            Some(deadline) => rx.recv_deadline(deadline),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(outcome) => on_lane_complete(collector, outcome),
            Err(RecvTimeoutError::Timeout) => {
                let ms = timeout.map_or(0, |t| t.as_millis());
                collector.fail_pending(&format!("exceeded lane deadline of {} ms", ms));
            }
            Err(RecvTimeoutError::Disconnected) => {
                collector.fail_pending("lane thread exited without reporting");
            }
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Lane-independent stages, configured once
pub struct Pipeline {
    config: PipelineConfig,
    windowizer: Windowizer,
    smoother: Smoother,
    calibrator: ThresholdCalibrator,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            windowizer: Windowizer::new(config.window_size, config.stride, config.featurization)?,
            smoother: Smoother::new(config.smoothing_width)?,
            calibrator: ThresholdCalibrator::new(config.threshold_percentile)?,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run with the reference engines built from the configured scorers
    pub fn run(
        &self,
        series: &MultivariateSeries,
        truth: &[GroundTruthInterval],
    ) -> Result<ComparisonReport> {
        let slots = self
            .config
            .scorers
            .iter()
            .map(|spec| {
                ScorerAdapter::from_spec(spec)
                    .map_err(|e| LaneFailure::new(spec.kind, &e, &spec.name))
            })
            .collect();
        self.execute(series, truth, slots)
    }

    /// Run with caller-built adapters (custom engines, stubs)
    pub fn run_with(
        &self,
        series: &MultivariateSeries,
        truth: &[GroundTruthInterval],
        adapters: Vec<ScorerAdapter>,
    ) -> Result<ComparisonReport> {
        self.execute(series, truth, adapters.into_iter().map(Ok).collect())
    }

    fn execute(
        &self,
        series: &MultivariateSeries,
        truth: &[GroundTruthInterval],
        slots: Vec<std::result::Result<ScorerAdapter, LaneFailure>>,
    ) -> Result<ComparisonReport> {
        let run_id = Uuid::new_v4();
        let n = series.len();
        self.config.validate_for_len(n)?;
        check_bounds(truth, n)?;

        let matrix = self.windowizer.transform(series)?;
        let feature_names = self.windowizer.feature_names(series);
        let (scaler, scaled) = FeatureScaler::fit_transform(&matrix)?;
        let degenerate_features: Vec<String> = scaler
            .degenerate_columns()
            .iter()
            .map(|&j| feature_names[j].clone())
            .collect();

        info!(
            run_id = %run_id,
            series_len = n,
            rows = scaled.n_rows(),
            width = scaled.width(),
            lanes = slots.len(),
            "Starting comparison run"
        );
        if !degenerate_features.is_empty() {
            debug!(count = degenerate_features.len(), "Degenerate feature columns");
        }

        let features = Arc::new(scaled);
        let collector = self.score_lanes(&features, slots);

        // Timeline stages per surviving lane
        let mut lanes = Vec::new();
        let mut failures = Vec::new();
        for (index, state) in collector.states.into_iter().enumerate() {
            let (name, kind) = (&collector.names[index], collector.kinds[index]);
            match state {
                LaneState::Scored { scores, elapsed_ms } => {
                    match self.build_timeline(&features, scores, n) {
                        Ok((raw_scores, score_series, normalized, smoothed)) => {
                            lanes.push(LaneResult {
                                name: name.clone(),
                                kind,
                                elapsed_ms,
                                raw_scores,
                                score_series,
                                normalized,
                                smoothed,
                                threshold: 0.0,
                                flags: AnomalyFlagSeries::from_flags(Vec::new()),
                                detected_intervals: Vec::new(),
                                iou: 0.0,
                                interval_report: None,
                                notes: Vec::new(),
                            })
                        }
                        Err(e) => {
                            warn!(lane = %name, error = %e, "Lane excluded");
                            failures.push(LaneFailure::new(kind, &e, name));
                        }
                    }
                }
                LaneState::Failed(failure) => failures.push(failure),
                LaneState::Pending => {
                    let error = AccordError::ScorerFitError {
                        lane: name.clone(),
                        reason: "lane never reported".to_string(),
                    };
                    failures.push(LaneFailure::new(kind, &error, name));
                }
            }
        }

        let shared_threshold = match self.config.threshold_mode {
            ThresholdMode::Shared if !lanes.is_empty() => {
                let pooled: Vec<&[f64]> = lanes.iter().map(|l| l.smoothed.as_slice()).collect();
                Some(self.calibrator.shared_threshold(&pooled)?)
            }
            _ => None,
        };

        for lane in &mut lanes {
            self.evaluate_lane(lane, shared_threshold, truth)?;
        }

        let flagged: Vec<(&str, &AnomalyFlagSeries)> =
            lanes.iter().map(|l| (l.name.as_str(), &l.flags)).collect();
        let agreement = IntervalEvaluator::agreement_matrix(&flagged)?;

        info!(
            run_id = %run_id,
            survived = lanes.len(),
            failed = failures.len(),
            "Comparison run complete"
        );

        Ok(ComparisonReport {
            run_id,
            generated_at: Utc::now(),
            config_fingerprint: format!("{:016x}", self.config.fingerprint()),
            series_len: n,
            feature_rows: features.n_rows(),
            degenerate_features,
            threshold_mode: self.config.threshold_mode,
            shared_threshold,
            truth: truth.to_vec(),
            lanes,
            failures,
            agreement,
        })
    }

    /// Fit and score every lane on its own thread and collect the outcomes
    fn score_lanes(
        &self,
        features: &Arc<FeatureMatrix>,
        slots: Vec<std::result::Result<ScorerAdapter, LaneFailure>>,
    ) -> LaneCollector {
        let lanes: Vec<(String, ScorerKind)> = slots
            .iter()
            .map(|slot| match slot {
                Ok(adapter) => (adapter.name().to_string(), adapter.kind()),
                Err(failure) => (failure.lane.clone(), failure.kind),
            })
            .collect();
        let mut collector = LaneCollector::new(&lanes);

        // Capacity covers every lane, so a lane finishing after the deadline never blocks
        let (tx, rx) = bounded::<LaneOutcome>(slots.len().max(1));

        for (index, slot) in slots.into_iter().enumerate() {
            let mut adapter = match slot {
                Ok(adapter) => adapter,
                Err(failure) => {
                    warn!(lane = %failure.lane, error = %failure.error, "Lane excluded");
                    collector.states[index] = LaneState::Failed(failure);
                    continue;
                }
            };

            let tx = tx.clone();
            let features = Arc::clone(features);
            let spawned = thread::Builder::new()
                .name(format!("lane-{}", adapter.name()))
                .spawn(move || {
                    let start = Instant::now();
                    let result = adapter
                        .fit(&features)
                        .and_then(|_| adapter.score(&features));
                    // The coordinator may have stopped listening after a timeout
                    let _ = tx.send(LaneOutcome {
                        index,
                        result,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                });

            if let Err(e) = spawned {
                let error = AccordError::ScorerFitError {
                    lane: lanes[index].0.clone(),
                    reason: format!("cannot spawn lane thread: {}", e),
                };
                collector.fail(index, &error);
            }
        }
        drop(tx);

        let timeout = self.config.lane_timeout_ms.map(Duration::from_millis);
        collect_lanes(&mut collector, &rx, timeout);
        collector
    }

    /// Raw scores → score series → normalized → smoothed
    fn build_timeline(
        &self,
        features: &FeatureMatrix,
        scores: ScoreVector,
        series_len: usize,
    ) -> Result<(ScoreVector, ScoreSeries, Vec<f64>, Vec<f64>)> {
        let series = TimelineReconstructor::reconstruct_matrix(features, &scores, series_len)?;
        let normalized = ScoreNormalizer::normalize(&series);
        let smoothed = self.smoother.smooth(&normalized);
        Ok((scores, series, normalized, smoothed))
    }

    /// Threshold, continuity filter and evaluation of one lane
    fn evaluate_lane(
        &self,
        lane: &mut LaneResult,
        shared_threshold: Option<f64>,
        truth: &[GroundTruthInterval],
    ) -> Result<()> {
        lane.threshold = match shared_threshold {
            Some(threshold) => threshold,
            None => self.calibrator.threshold(&lane.smoothed)?,
        };
        lane.flags = AnomalyFlagSeries::above(&lane.smoothed, lane.threshold)
            .with_min_run(self.config.min_run_length);
        lane.detected_intervals = lane.flags.runs();

        lane.iou = match IntervalEvaluator::iou_vs_truth(&lane.flags, truth) {
            Ok(iou) => iou,
            Err(AccordError::EmptyEvaluationInput) => {
                lane.notes
                    .push("no ground truth and no flagged timesteps; IoU taken as 1".to_string());
                1.0
            }
            Err(e) => return Err(e),
        };
        if !truth.is_empty() {
            lane.interval_report = Some(IntervalEvaluator::interval_report(
                &lane.flags,
                &lane.smoothed,
                truth,
            )?);
        }

        debug!(
            lane = %lane.name,
            threshold = lane.threshold,
            flagged = lane.flags.count(),
            iou = lane.iou,
            "Lane evaluated"
        );
        Ok(())
    }
}
