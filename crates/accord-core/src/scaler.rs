//! Per-column z-score scaling
//!
//! A single fitted scaler serves every lane of a run so all models see
//! identically distributed features.

use crate::error::{AccordError, Result};
use crate::window::FeatureMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Relative standard deviation below which a column is treated as constant
const DEGENERATE_STD: f64 = 1e-12;

/// Fitted column statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
    degenerate: Vec<usize>,
}

impl FeatureScaler {
    /// Estimate per-column mean and population standard deviation.
    ///
    /// Zero-variance columns are recorded instead of failing the fit; they
    /// transform to all zeros.
    pub fn fit(matrix: &FeatureMatrix) -> Result<Self> {
        if matrix.is_empty() {
            return Err(AccordError::invalid_input("cannot fit scaler on an empty matrix"));
        }

        let mut means = Vec::with_capacity(matrix.width());
        let mut stds = Vec::with_capacity(matrix.width());
        let mut degenerate = Vec::new();

        for j in 0..matrix.width() {
            let column = matrix.column(j);
            let (mean, std) = column_stats(&column);
            means.push(mean);
            match check_column(j, mean, std) {
                Ok(()) => stds.push(std),
                Err(AccordError::DegenerateColumn { column }) => {
                    debug!(column, mean, "Degenerate feature column; leaving centered at zero");
                    degenerate.push(column);
                    stds.push(0.0);
                }
                Err(other) => return Err(other),
            }
        }

        Ok(Self {
            means,
            stds,
            degenerate,
        })
    }

    /// Fit on `matrix` and return it scaled
    pub fn fit_transform(matrix: &FeatureMatrix) -> Result<(Self, FeatureMatrix)> {
        let scaler = Self::fit(matrix)?;
        let scaled = scaler.transform(matrix)?;
        Ok((scaler, scaled))
    }

    /// Scale a matrix with the fitted statistics, returning a new matrix
    pub fn transform(&self, matrix: &FeatureMatrix) -> Result<FeatureMatrix> {
        if matrix.width() != self.means.len() {
            return Err(AccordError::invalid_input(format!(
                "scaler fitted on {} features, matrix has {}",
                self.means.len(),
                matrix.width()
            )));
        }

        let rows = matrix
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(&self.stds))
                    .map(|(&x, (&mean, &std))| if std > 0.0 { (x - mean) / std } else { 0.0 })
                    .collect()
            })
            .collect();

        Ok(matrix.with_rows(rows))
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    /// Indices of zero-variance columns
    pub fn degenerate_columns(&self) -> &[usize] {
        &self.degenerate
    }
}

fn column_stats(column: &[f64]) -> (f64, f64) {
    let n = column.len() as f64;
    let mean = column.iter().sum::<f64>() / n;
    let var = column.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn check_column(column: usize, mean: f64, std: f64) -> Result<()> {
    if std < DEGENERATE_STD * mean.abs().max(1.0) {
        Err(AccordError::DegenerateColumn { column })
    } else {
        Ok(())
    }
}
