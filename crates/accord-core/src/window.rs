//! Sliding-window featurization
//!
//! Turns a `MultivariateSeries` into a `FeatureMatrix`, one row per window
//! offset. Flatten rows keep every sample (stride fixed at 1); summary rows
//! keep mean/std/min/max per channel and may be strided.

use crate::config::Featurization;
use crate::error::{AccordError, Result};
use crate::series::MultivariateSeries;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

/// Rows of equal width, each tagged with the offset of its window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    rows: Vec<Vec<f64>>,
    offsets: Vec<usize>,
    width: usize,
    window_size: usize,
}

impl FeatureMatrix {
    /// Build a matrix from raw rows. `offsets[i]` is the start of row `i`'s window.
    pub fn new(rows: Vec<Vec<f64>>, offsets: Vec<usize>, window_size: usize) -> Result<Self> {
        if rows.len() != offsets.len() {
            return Err(AccordError::invalid_input(format!(
                "{} rows but {} offsets",
                rows.len(),
                offsets.len()
            )));
        }
        let width = rows.first().map_or(0, Vec::len);
        if let Some(i) = rows.iter().position(|r| r.len() != width) {
            return Err(AccordError::invalid_input(format!(
                "row {} has width {}, expected {}",
                i,
                rows[i].len(),
                width
            )));
        }
        Ok(Self {
            rows,
            offsets,
            width,
            window_size,
        })
    }

    /// Rows with unit-spaced offsets starting at 0 (handy for engines and tests)
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let offsets = (0..rows.len()).collect();
        Self::new(rows, offsets, 1)
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of features per row
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Representative timestep of each row: `offset + W/2`
    pub fn centers(&self) -> Vec<usize> {
        self.offsets
            .iter()
            .map(|&offset| offset + self.window_size / 2)
            .collect()
    }

    /// All values of one feature column
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[j]).collect()
    }

    /// Content fingerprint (xxh3 over shape and values)
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(&(self.rows.len() as u64).to_le_bytes());
        hasher.update(&(self.width as u64).to_le_bytes());
        for row in &self.rows {
            for value in row {
                hasher.update(&value.to_bits().to_le_bytes());
            }
        }
        hasher.digest()
    }

    /// Same offsets and window, new values (used by the scaler)
    pub(crate) fn with_rows(&self, rows: Vec<Vec<f64>>) -> Self {
        Self {
            width: rows.first().map_or(self.width, Vec::len),
            rows,
            offsets: self.offsets.clone(),
            window_size: self.window_size,
        }
    }
}

/// Slices a series into fixed-length windows and featurizes each one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windowizer {
    window_size: usize,
    stride: usize,
    featurization: Featurization,
}

impl Windowizer {
    pub fn new(window_size: usize, stride: usize, featurization: Featurization) -> Result<Self> {
        if window_size == 0 {
            return Err(AccordError::invalid_config("window_size must be > 0"));
        }
        if stride == 0 {
            return Err(AccordError::invalid_config("stride must be >= 1"));
        }
        if featurization == Featurization::Flatten && stride != 1 {
            return Err(AccordError::invalid_config(
                "flatten featurization requires stride 1",
            ));
        }
        Ok(Self {
            window_size,
            stride,
            featurization,
        })
    }

    /// Dense flatten windowizer (stride 1)
    pub fn flatten(window_size: usize) -> Result<Self> {
        Self::new(window_size, 1, Featurization::Flatten)
    }

    pub fn summary(window_size: usize, stride: usize) -> Result<Self> {
        Self::new(window_size, stride, Featurization::Summary)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Rows produced for a series of length `n`
    pub fn row_count(&self, n: usize) -> usize {
        if self.window_size > n {
            return 0;
        }
        (n - self.window_size) / self.stride + 1
    }

    pub fn transform(&self, series: &MultivariateSeries) -> Result<FeatureMatrix> {
        let n = series.len();
        if self.window_size > n {
            return Err(AccordError::invalid_config(format!(
                "window_size {} exceeds series length {}",
                self.window_size, n
            )));
        }

        let offsets: Vec<usize> = (0..=n - self.window_size).step_by(self.stride).collect();
        let rows = offsets
            .iter()
            .map(|&offset| match self.featurization {
                Featurization::Flatten => self.flatten_window(series, offset),
                Featurization::Summary => self.summarize_window(series, offset),
            })
            .collect();

        FeatureMatrix::new(rows, offsets, self.window_size)
    }

    /// Column names matching `transform`'s output
    pub fn feature_names(&self, series: &MultivariateSeries) -> Vec<String> {
        let channels = series.channel_names();
        match self.featurization {
            Featurization::Flatten => (0..self.window_size)
                .flat_map(|k| channels.iter().map(move |c| format!("{}[t+{}]", c, k)))
                .collect(),
            Featurization::Summary => channels
                .iter()
                .flat_map(|c| {
                    ["mean", "std", "min", "max"]
                        .into_iter()
                        .map(move |stat| format!("{}_{}", c, stat))
                })
                .collect(),
        }
    }

    // Sample-major: all channels of t, then all channels of t+1, ...
    fn flatten_window(&self, series: &MultivariateSeries, offset: usize) -> Vec<f64> {
        let channels = series.channel_count();
        let mut row = Vec::with_capacity(self.window_size * channels);
        for t in offset..offset + self.window_size {
            for c in 0..channels {
                row.push(series.value(t, c));
            }
        }
        row
    }

    fn summarize_window(&self, series: &MultivariateSeries, offset: usize) -> Vec<f64> {
        let mut row = Vec::with_capacity(4 * series.channel_count());
        for c in 0..series.channel_count() {
            let window = &series.column(c)[offset..offset + self.window_size];
            let (mean, std) = mean_and_sample_std(window);
            let min = window.iter().copied().fold(f64::INFINITY, f64::min);
            let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            row.extend_from_slice(&[mean, std, min, max]);
        }
        row
    }
}

/// Mean and sample standard deviation (ddof = 1; 0 for a single value)
fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (ss / (n - 1.0)).sqrt())
}
