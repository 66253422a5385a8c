//! Interval agreement
//!
//! Compares flag series with each other (pairwise Jaccard) and with the
//! labeled anomalous intervals: interval-level metrics on the flags, plus
//! threshold-free ROC-AUC / PR-AUC on the scores behind them.

use crate::error::{AccordError, Result};
use crate::series::{GroundTruthInterval, truth_mask};
use crate::threshold::AnomalyFlagSeries;
use serde::{Deserialize, Serialize};

/// Interval-level comparison of one lane's flags with the ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalReport {
    pub iou: f64,
    /// Flagged timesteps inside the truth / flagged timesteps
    pub precision: f64,
    /// Truth timesteps flagged / truth timesteps
    pub recall: f64,
    /// Flagged timesteps outside the truth / timesteps outside the truth
    pub false_positive_rate: f64,
    pub intervals_total: usize,
    /// Truth intervals with at least one flagged timestep
    pub intervals_detected: usize,
    /// Mean steps from interval start to the first flag inside it
    pub mean_detection_delay: Option<f64>,
    /// Area under the ROC curve of the scores vs the truth mask; `None`
    /// when every timestep is inside the truth
    pub roc_auc: Option<f64>,
    /// Average precision of the scores vs the truth mask
    pub pr_auc: Option<f64>,
}

/// Symmetric pairwise Jaccard agreement between lanes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementMatrix {
    pub lanes: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl AgreementMatrix {
    /// Agreement between two lanes by name
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.lanes.iter().position(|l| l == a)?;
        let j = self.lanes.iter().position(|l| l == b)?;
        Some(self.values[i][j])
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}

pub struct IntervalEvaluator;

impl IntervalEvaluator {
    /// `|A ∩ B| / |A ∪ B|` over flagged indices; 1 when both are empty
    pub fn jaccard(a: &AnomalyFlagSeries, b: &AnomalyFlagSeries) -> Result<f64> {
        if a.len() != b.len() {
            return Err(AccordError::invalid_input(format!(
                "flag series lengths differ: {} vs {}",
                a.len(),
                b.len()
            )));
        }
        Ok(jaccard_masks(a.flags(), b.flags()))
    }

    /// IoU between the flags and the union of the truth intervals.
    ///
    /// With no truth, any flag gives 0; no flags at all is
    /// `EmptyEvaluationInput`, left to the caller to resolve.
    pub fn iou_vs_truth(flags: &AnomalyFlagSeries, truth: &[GroundTruthInterval]) -> Result<f64> {
        check_bounds(truth, flags.len())?;
        if truth.is_empty() {
            return if flags.count() == 0 {
                Err(AccordError::EmptyEvaluationInput)
            } else {
                Ok(0.0)
            };
        }
        let mask = truth_mask(truth, flags.len());
        Ok(jaccard_masks(flags.flags(), &mask))
    }

    /// IoU, precision, recall, false-positive rate and detection delay of
    /// `flags`, plus ROC-AUC and PR-AUC of the `scores` they were cut from
    pub fn interval_report(
        flags: &AnomalyFlagSeries,
        scores: &[f64],
        truth: &[GroundTruthInterval],
    ) -> Result<IntervalReport> {
        check_bounds(truth, flags.len())?;
        if truth.is_empty() {
            return Err(AccordError::EmptyEvaluationInput);
        }
        if scores.len() != flags.len() {
            return Err(AccordError::invalid_input(format!(
                "{} scores for {} flags",
                scores.len(),
                flags.len()
            )));
        }

        let mask = truth_mask(truth, flags.len());
        let (mut hit, mut flagged, mut truth_size, mut false_alarms) = (0usize, 0usize, 0usize, 0usize);
        for (&f, &t) in flags.flags().iter().zip(&mask) {
            flagged += f as usize;
            truth_size += t as usize;
            hit += (f && t) as usize;
            false_alarms += (f && !t) as usize;
        }
        let outside = flags.len() - truth_size;

        let delays: Vec<f64> = truth
            .iter()
            .filter_map(|interval| {
                (interval.start..=interval.end)
                    .find(|&t| flags.is_flagged(t))
                    .map(|t| (t - interval.start) as f64)
            })
            .collect();

        Ok(IntervalReport {
            iou: jaccard_masks(flags.flags(), &mask),
            precision: ratio(hit, flagged),
            recall: ratio(hit, truth_size),
            false_positive_rate: ratio(false_alarms, outside),
            intervals_total: truth.len(),
            intervals_detected: delays.len(),
            mean_detection_delay: (!delays.is_empty())
                .then(|| delays.iter().sum::<f64>() / delays.len() as f64),
            roc_auc: Self::roc_auc(scores, &mask),
            pr_auc: Self::pr_auc(scores, &mask),
        })
    }

    /// Probability that a random positive outscores a random negative, ties
    /// counting half (Mann-Whitney U over average ranks). `None` without
    /// both classes.
    pub fn roc_auc(scores: &[f64], labels: &[bool]) -> Option<f64> {
        let positives = labels.iter().filter(|&&l| l).count();
        let negatives = labels.len() - positives;
        if positives == 0 || negatives == 0 || scores.len() != labels.len() {
            return None;
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

        let mut positive_rank_sum = 0.0;
        let mut start = 0;
        while start < order.len() {
            let mut end = start;
            while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
                end += 1;
            }
            // 1-based ranks start+1 ..= end+1 share their mean
            let rank = (start + end) as f64 / 2.0 + 1.0;
            let tied_positives = order[start..=end].iter().filter(|&&i| labels[i]).count();
            positive_rank_sum += rank * tied_positives as f64;
            start = end + 1;
        }

        let p = positives as f64;
        Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
    }

    /// Average precision: `Σ (Rₖ - Rₖ₋₁) · Pₖ` over descending distinct
    /// score thresholds. `None` without positives.
    pub fn pr_auc(scores: &[f64], labels: &[bool]) -> Option<f64> {
        let positives = labels.iter().filter(|&&l| l).count();
        if positives == 0 || scores.len() != labels.len() {
            return None;
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        let (mut tp, mut fp) = (0usize, 0usize);
        let (mut area, mut prev_recall) = (0.0, 0.0);
        let mut k = 0;
        while k < order.len() {
            let threshold = scores[order[k]];
            while k < order.len() && scores[order[k]] == threshold {
                if labels[order[k]] {
                    tp += 1;
                } else {
                    fp += 1;
                }
                k += 1;
            }
            let recall = tp as f64 / positives as f64;
            let precision = tp as f64 / (tp + fp) as f64;
            area += (recall - prev_recall) * precision;
            prev_recall = recall;
        }
        Some(area)
    }

    /// Pairwise Jaccard across lanes, in the given order
    pub fn agreement_matrix(lanes: &[(&str, &AnomalyFlagSeries)]) -> Result<AgreementMatrix> {
        let n = lanes.len();
        let mut values = vec![vec![1.0; n]; n];
        for i in 0..n {
            for j in i + 1..n {
                let v = Self::jaccard(lanes[i].1, lanes[j].1)?;
                values[i][j] = v;
                values[j][i] = v;
            }
        }
        Ok(AgreementMatrix {
            lanes: lanes.iter().map(|(name, _)| name.to_string()).collect(),
            values,
        })
    }
}

fn jaccard_masks(a: &[bool], b: &[bool]) -> f64 {
    let (mut inter, mut union) = (0usize, 0usize);
    for (&x, &y) in a.iter().zip(b) {
        inter += (x && y) as usize;
        union += (x || y) as usize;
    }
    if union == 0 {
        1.0
    } else {
        inter as f64 / union as f64
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Truth intervals must lie inside the series
pub(crate) fn check_bounds(truth: &[GroundTruthInterval], len: usize) -> Result<()> {
    match truth.iter().find(|i| i.end >= len) {
        Some(interval) => Err(AccordError::invalid_input(format!(
            "ground truth interval {} outside series of length {}",
            interval, len
        ))),
        None => Ok(()),
    }
}
