//! accord-bench - batch comparison runner
//!
//! Loads a series and a configuration from JSON, runs the comparison
//! pipeline, and renders the report as a text table or percentile sweep.

use accord_core::{
    ComparisonReport, GroundTruthInterval, MultivariateSeries, PipelineConfig, SweepPoint,
    ThresholdCalibrator,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Percentiles printed by `sweep` when none are given
pub const DEFAULT_SWEEP: [f64; 4] = [90.0, 95.0, 97.0, 99.0];

const RULE: &str = "══════════════════════════════════════════════════════════════";
const THIN: &str = "──────────────────────────────────────────────────────────────";

/// Read a `{"channels": [...]}` series file
pub fn load_series(path: &Path) -> Result<MultivariateSeries> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading series {}", path.display()))?;
    MultivariateSeries::from_json_str(&raw)
        .with_context(|| format!("parsing series {}", path.display()))
}

/// Configuration file, or the defaults when no path is given
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.validate().context("validating config")?;
    Ok(config)
}

/// Parse `start:end` arguments
pub fn parse_truth(specs: &[String]) -> Result<Vec<GroundTruthInterval>> {
    specs
        .iter()
        .map(|s| {
            s.parse::<GroundTruthInterval>()
                .with_context(|| format!("ground truth '{}'", s))
        })
        .collect()
}

/// Percentile sweep of one lane's smoothed series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneSweep {
    pub lane: String,
    pub points: Vec<SweepPoint>,
}

pub fn sweep_report(report: &ComparisonReport, percentiles: &[f64]) -> Result<Vec<LaneSweep>> {
    report
        .lanes
        .iter()
        .map(|lane| {
            let points = ThresholdCalibrator::sweep(&lane.smoothed, percentiles)
                .with_context(|| format!("sweeping lane {}", lane.name))?;
            Ok(LaneSweep {
                lane: lane.name.clone(),
                points,
            })
        })
        .collect()
}

pub fn export_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serializing to JSON")
}

fn percent(v: f64) -> f64 {
    v * 100.0
}

/// Fixed-precision table cell, `-` when the metric is missing
fn cell(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.*}", precision, v))
}

/// Summary table of a comparison run
pub fn render_report(report: &ComparisonReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "╔{}╗", RULE);
    let _ = writeln!(out, "║{:^62}║", "ACCORD COMPARISON REPORT");
    let _ = writeln!(out, "╠{}╣", RULE);
    let _ = writeln!(out, "║ Run:        {:48} ║", report.run_id.to_string());
    let _ = writeln!(out, "║ Generated:  {:48} ║", report.generated_at.to_rfc3339());
    let _ = writeln!(out, "║ Config:     {:48} ║", report.config_fingerprint);
    let _ = writeln!(
        out,
        "║ Series:     {:>6} steps | {:>6} windows {:18} ║",
        report.series_len, report.feature_rows, ""
    );
    let _ = writeln!(
        out,
        "║ Degenerate: {:>6} feature columns {:25} ║",
        report.degenerate_features.len(),
        ""
    );
    let threshold_mode = match report.shared_threshold {
        Some(t) => format!("{:?} ({:.4})", report.threshold_mode, t),
        None => format!("{:?}", report.threshold_mode),
    };
    let _ = writeln!(out, "║ Threshold:  {:48} ║", threshold_mode);
    if !report.truth.is_empty() {
        let truth = report
            .truth
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "║ Truth:      {:48} ║", truth);
    }

    let _ = writeln!(out, "╠{}╣", RULE);
    let _ = writeln!(out, "║ {:60} ║", "LANES");
    let _ = writeln!(out, "╠{}╣", THIN);
    let _ = writeln!(
        out,
        "║ {:15} {:>7} {:>7} {:>4} {:>5} {:>5} {:>5} {:>5} ║",
        "name", "thresh", "flagged", "runs", "IoU", "P%", "R%", "ROC"
    );
    for lane in &report.lanes {
        let metrics = lane.interval_report.as_ref();
        let _ = writeln!(
            out,
            "║ {:15.15} {:>7.4} {:>7} {:>4} {:>5.3} {:>5} {:>5} {:>5} ║",
            lane.name,
            lane.threshold,
            lane.flags.count(),
            lane.detected_intervals.len(),
            lane.iou,
            cell(metrics.map(|r| percent(r.precision)), 1),
            cell(metrics.map(|r| percent(r.recall)), 1),
            cell(metrics.and_then(|r| r.roc_auc), 3),
        );
        for note in &lane.notes {
            let _ = writeln!(out, "║   note: {:52.52} ║", note);
        }
    }

    if !report.failures.is_empty() {
        let _ = writeln!(out, "╠{}╣", THIN);
        let _ = writeln!(out, "║ {:60} ║", "EXCLUDED");
        for failure in &report.failures {
            let _ = writeln!(out, "║ {:16.16} {:43.43} ║", failure.lane, failure.error);
        }
    }

    if report.agreement.lanes.len() > 1 {
        let _ = writeln!(out, "╠{}╣", THIN);
        let _ = writeln!(out, "║ {:60} ║", "AGREEMENT (Jaccard)");
        let lanes = &report.agreement.lanes;
        for (i, a) in lanes.iter().enumerate() {
            for (j, b) in lanes.iter().enumerate().skip(i + 1) {
                let pair = format!("{} vs {}", a, b);
                let _ = writeln!(
                    out,
                    "║ {:50.50} {:>9.3} ║",
                    pair, report.agreement.values[i][j]
                );
            }
        }
    }

    let _ = writeln!(out, "╚{}╝", RULE);
    out
}

/// Sweep table, one block per lane
pub fn render_sweep(sweeps: &[LaneSweep]) -> String {
    let mut out = String::new();
    for sweep in sweeps {
        let _ = writeln!(out, "{}", sweep.lane);
        let _ = writeln!(out, "  {:>10} {:>12} {:>8}", "percentile", "threshold", "flagged");
        for point in &sweep.points {
            let _ = writeln!(
                out,
                "  {:>10.1} {:>12.4} {:>8}",
                point.percentile, point.threshold, point.flagged
            );
        }
    }
    out
}
