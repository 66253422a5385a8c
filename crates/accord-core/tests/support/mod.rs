//! Synthetic series shared by the integration tests

#![allow(dead_code)]

use accord_core::algo::ModelError;
use accord_core::{FeatureMatrix, MultivariateSeries, NormalityModel, TransductiveModel};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

/// Five periodic sensor channels with 0.1 noise, plus N(0, 3) added to every
/// channel inside `anomaly` (closed range)
pub fn sensor_series(len: usize, anomaly: Option<(usize, usize)>, seed: u64) -> MultivariateSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.1).unwrap();
    let burst = Normal::new(0.0, 3.0).unwrap();

    let t: Vec<f64> = (0..len)
        .map(|i| 20.0 * PI * i as f64 / (len - 1).max(1) as f64)
        .collect();
    let shapes: [(&str, fn(f64) -> f64); 5] = [
        ("current", |t| t.sin()),
        ("rpm", |t| t.cos()),
        ("sound", |t| 0.5 * (2.0 * t).sin()),
        ("vibration", |t| 0.5 * (0.5 * t).cos()),
        ("temperature", |t| 25.0 + 0.2 * (0.1 * t).sin()),
    ];

    let columns = shapes
        .iter()
        .map(|(name, shape)| {
            let values: Vec<f64> = t
                .iter()
                .enumerate()
                .map(|(i, &ti)| {
                    let mut v = shape(ti) + noise.sample(&mut rng);
                    if let Some((start, end)) = anomaly {
                        if (start..=end).contains(&i) {
                            v += burst.sample(&mut rng);
                        }
                    }
                    v
                })
                .collect();
            (name.to_string(), values)
        })
        .collect();

    MultivariateSeries::from_columns(columns).unwrap()
}

/// Every channel flat
pub fn constant_series(len: usize) -> MultivariateSeries {
    MultivariateSeries::from_columns(
        (0..3)
            .map(|c| (format!("ch{}", c), vec![c as f64 + 1.0; len]))
            .collect(),
    )
    .unwrap()
}

/// Normality = minus the first feature, so larger first feature = more anomalous
pub struct FirstFeature;

impl NormalityModel for FirstFeature {
    fn fit(&mut self, _: &FeatureMatrix) -> Result<(), ModelError> {
        Ok(())
    }

    fn normality(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        Ok(features.column(0).into_iter().map(|v| -v).collect())
    }
}

/// Normality = minus the sum of squares of the row
pub struct Energy;

impl TransductiveModel for Energy {
    fn fit_normality(&mut self, features: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        Ok(features
            .rows()
            .iter()
            .map(|r| -r.iter().map(|x| x * x).sum::<f64>())
            .collect())
    }
}

/// Same normality everywhere
pub struct Flat;

impl NormalityModel for Flat {
    fn fit(&mut self, _: &FeatureMatrix) -> Result<(), ModelError> {
        Ok(())
    }

    fn normality(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        Ok(vec![1.0; features.n_rows()])
    }
}

/// Sleeps through fit
pub struct Sluggish(pub Duration);

impl NormalityModel for Sluggish {
    fn fit(&mut self, _: &FeatureMatrix) -> Result<(), ModelError> {
        thread::sleep(self.0);
        Ok(())
    }

    fn normality(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        Ok(vec![0.0; features.n_rows()])
    }
}

pub struct NeverConverges;

impl NormalityModel for NeverConverges {
    fn fit(&mut self, _: &FeatureMatrix) -> Result<(), ModelError> {
        Err(ModelError::NotConverged { iterations: 1000 })
    }

    fn normality(&self, _: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        Err(ModelError::NotFitted)
    }
}
