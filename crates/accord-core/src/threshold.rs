//! Percentile Threshold Calibration
//!
//! A lane's smoothed series is cut at a percentile of its own values
//! (per-lane mode) or of every lane's values pooled together (shared mode).
//! Timesteps strictly above the cut are flagged. An optional continuity
//! filter then drops flagged runs shorter than a minimum length.

use crate::error::{AccordError, Result};
use serde::{Deserialize, Serialize};

/// Linear-interpolation percentile of unsorted values (`q` in [0, 100]).
///
/// Rank is `q/100 × (n-1)`; returns 0 for an empty slice.
pub(crate) fn percentile_of(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Checked percentile: rejects empty input and `p` outside [0, 100]
pub fn percentile(values: &[f64], p: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(AccordError::invalid_input("percentile of an empty series"));
    }
    if !p.is_finite() || !(0.0..=100.0).contains(&p) {
        return Err(AccordError::invalid_config(format!(
            "percentile must be in [0, 100], got {}",
            p
        )));
    }
    Ok(percentile_of(values, p))
}

/// Maximal run of consecutive flagged timesteps, closed range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRun {
    pub start: usize,
    pub end: usize,
}

impl FlagRun {
    /// Timesteps covered (closed range, at least 1)
    pub fn span(&self) -> usize {
        self.end - self.start + 1
    }
}

/// One boolean per timestep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnomalyFlagSeries(Vec<bool>);

impl AnomalyFlagSeries {
    pub fn from_flags(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    /// Flag every value strictly above `threshold`
    pub fn above(values: &[f64], threshold: f64) -> Self {
        Self(values.iter().map(|&v| v > threshold).collect())
    }

    pub fn flags(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_flagged(&self, t: usize) -> bool {
        self.0.get(t).copied().unwrap_or(false)
    }

    /// Indices of flagged timesteps, ascending
    pub fn indices(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(t, &f)| f.then_some(t))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&f| f).count()
    }

    /// Fraction of timesteps flagged
    pub fn rate(&self) -> f64 {
        if self.0.is_empty() {
            0.0
        } else {
            self.count() as f64 / self.0.len() as f64
        }
    }

    /// Maximal flagged runs (detected intervals), in time order
    pub fn runs(&self) -> Vec<FlagRun> {
        let mut runs = Vec::new();
        let mut start = None;
        for (t, &flag) in self.0.iter().enumerate() {
            match (flag, start) {
                (true, None) => start = Some(t),
                (false, Some(s)) => {
                    runs.push(FlagRun { start: s, end: t - 1 });
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            runs.push(FlagRun {
                start: s,
                end: self.0.len() - 1,
            });
        }
        runs
    }

    /// Drop flagged runs shorter than `min_len` (1 keeps everything)
    pub fn with_min_run(&self, min_len: usize) -> Self {
        if min_len <= 1 {
            return self.clone();
        }
        let mut flags = vec![false; self.0.len()];
        for run in self.runs().into_iter().filter(|r| r.span() >= min_len) {
            flags[run.start..=run.end].fill(true);
        }
        Self(flags)
    }
}

/// Result of one percentile in a sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub percentile: f64,
    pub threshold: f64,
    pub flagged: usize,
}

/// Percentile cut shared by the pipeline and the sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdCalibrator {
    percentile: f64,
}

impl Default for ThresholdCalibrator {
    fn default() -> Self {
        Self { percentile: 95.0 }
    }
}

impl ThresholdCalibrator {
    pub fn new(percentile: f64) -> Result<Self> {
        if !percentile.is_finite() || !(0.0..=100.0).contains(&percentile) {
            return Err(AccordError::invalid_config(format!(
                "threshold percentile must be in [0, 100], got {}",
                percentile
            )));
        }
        Ok(Self { percentile })
    }

    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    /// Threshold for one lane's own distribution
    pub fn threshold(&self, smoothed: &[f64]) -> Result<f64> {
        percentile(smoothed, self.percentile)
    }

    /// Threshold over the pooled values of several lanes
    pub fn shared_threshold(&self, lanes: &[&[f64]]) -> Result<f64> {
        let pooled: Vec<f64> = lanes.iter().flat_map(|l| l.iter().copied()).collect();
        percentile(&pooled, self.percentile)
    }

    /// Threshold and flags for one lane (per-lane mode)
    pub fn calibrate(&self, smoothed: &[f64]) -> Result<(f64, AnomalyFlagSeries)> {
        let threshold = self.threshold(smoothed)?;
        Ok((threshold, AnomalyFlagSeries::above(smoothed, threshold)))
    }

    /// Threshold and flagged count at each percentile, for tuning
    pub fn sweep(values: &[f64], percentiles: &[f64]) -> Result<Vec<SweepPoint>> {
        percentiles
            .iter()
            .map(|&p| {
                let threshold = percentile(values, p)?;
                Ok(SweepPoint {
                    percentile: p,
                    threshold,
                    flagged: values.iter().filter(|&&v| v > threshold).count(),
                })
            })
            .collect()
    }
}
