//! accord-bench - compare anomaly scorers on one series
//!
//! Usage:
//!   accord-bench run series.json --truth 600:700          # Summary table
//!   accord-bench run series.json -c config.json -o out.json
//!   accord-bench sweep series.json -p 90 -p 95 -p 99      # Percentile sweep
//!   accord-bench show-config -c config.json               # Effective config

use accord_bench::{
    DEFAULT_SWEEP, export_json, load_config, load_series, parse_truth, render_report,
    render_sweep, sweep_report,
};
use accord_core::Pipeline;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "accord-bench")]
#[command(about = "Reconcile and compare unsupervised anomaly scorers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pipeline configuration (JSON); defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every lane and print the comparison table
    Run {
        /// Series file
        series: PathBuf,

        /// Ground-truth interval `start:end` (repeatable)
        #[arg(short, long)]
        truth: Vec<String>,

        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Flagged counts per lane across several percentiles
    Sweep {
        /// Series file
        series: PathBuf,

        /// Percentile to try (repeatable; default 90, 95, 97, 99)
        #[arg(short, long)]
        percentile: Vec<f64>,

        /// Write the sweep as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            series,
            truth,
            output,
        } => {
            let series = load_series(&series)?;
            let truth = parse_truth(&truth)?;
            let report = Pipeline::new(config)?.run(&series, &truth)?;
            print!("{}", render_report(&report));

            if let Some(path) = output {
                std::fs::write(&path, export_json(&report)?)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!(path = %path.display(), "Report saved");
            }
        }
        Commands::Sweep {
            series,
            percentile,
            output,
        } => {
            let percentiles = if percentile.is_empty() {
                DEFAULT_SWEEP.to_vec()
            } else {
                percentile
            };
            let series = load_series(&series)?;
            let report = Pipeline::new(config)?.run(&series, &[])?;
            let sweeps = sweep_report(&report, &percentiles)?;
            print!("{}", render_sweep(&sweeps));

            if let Some(path) = output {
                std::fs::write(&path, export_json(&sweeps)?)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!(path = %path.display(), "Sweep saved");
            }
        }
        Commands::ShowConfig => {
            println!("{}", export_json(&config)?);
        }
    }

    Ok(())
}
