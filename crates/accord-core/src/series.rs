//! Input data model: multivariate series and ground-truth intervals

use crate::error::{AccordError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// One named channel of a series (serde form)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelData {
    pub name: String,
    pub values: Vec<f64>,
}

/// Serialized layout of a series file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesFile {
    pub channels: Vec<ChannelData>,
}

/// Fixed-length multivariate time series over an ordered channel set.
///
/// Stored column-major. Every channel has the same length and only finite
/// values; the core never imputes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeriesFile", into = "SeriesFile")]
pub struct MultivariateSeries {
    channels: Vec<String>,
    columns: Vec<Vec<f64>>,
    len: usize,
}

impl MultivariateSeries {
    /// Build from named columns, in channel order
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        if columns.is_empty() {
            return Err(AccordError::invalid_input("series has no channels"));
        }

        let len = columns[0].1.len();
        let mut seen = HashSet::with_capacity(columns.len());
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());

        for (name, values) in columns {
            if !seen.insert(name.clone()) {
                return Err(AccordError::invalid_input(format!(
                    "duplicate channel name '{}'",
                    name
                )));
            }
            if values.len() != len {
                return Err(AccordError::invalid_input(format!(
                    "channel '{}' has {} samples, expected {}",
                    name,
                    values.len(),
                    len
                )));
            }
            if let Some(t) = values.iter().position(|v| !v.is_finite()) {
                return Err(AccordError::invalid_input(format!(
                    "channel '{}' has a non-finite value at t={}",
                    name, t
                )));
            }
            names.push(name);
            data.push(values);
        }

        if len == 0 {
            return Err(AccordError::invalid_input("series has no samples"));
        }

        Ok(Self {
            channels: names,
            columns: data,
            len,
        })
    }

    /// Build from row samples; each sample lists one value per channel
    pub fn from_samples(channels: Vec<String>, samples: &[Vec<f64>]) -> Result<Self> {
        let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(samples.len()); channels.len()];
        for (t, sample) in samples.iter().enumerate() {
            if sample.len() != channels.len() {
                return Err(AccordError::invalid_input(format!(
                    "sample {} has {} values, expected {}",
                    t,
                    sample.len(),
                    channels.len()
                )));
            }
            for (column, &value) in columns.iter_mut().zip(sample) {
                column.push(value);
            }
        }
        Self::from_columns(channels.into_iter().zip(columns).collect())
    }

    /// Parse the `{"channels": [{"name", "values"}, ...]}` JSON layout
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| AccordError::invalid_input(format!("series JSON: {}", e)))
    }

    /// Number of samples `N`
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channels
    }

    /// All samples of one channel
    pub fn column(&self, channel: usize) -> &[f64] {
        &self.columns[channel]
    }

    pub fn value(&self, t: usize, channel: usize) -> f64 {
        self.columns[channel][t]
    }
}

impl TryFrom<SeriesFile> for MultivariateSeries {
    type Error = AccordError;

    fn try_from(file: SeriesFile) -> Result<Self> {
        Self::from_columns(
            file.channels
                .into_iter()
                .map(|c| (c.name, c.values))
                .collect(),
        )
    }
}

impl From<MultivariateSeries> for SeriesFile {
    fn from(series: MultivariateSeries) -> Self {
        SeriesFile {
            channels: series
                .channels
                .into_iter()
                .zip(series.columns)
                .map(|(name, values)| ChannelData { name, values })
                .collect(),
        }
    }
}

/// Closed index range `[start, end]` of labeled anomalous timesteps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IntervalBounds")]
pub struct GroundTruthInterval {
    pub start: usize,
    pub end: usize,
}

impl GroundTruthInterval {
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if start > end {
            return Err(AccordError::invalid_input(format!(
                "ground truth interval start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, t: usize) -> bool {
        self.start <= t && t <= self.end
    }

    /// Number of timesteps covered (closed range, never zero)
    pub fn span(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Unchecked serde form; `start <= end` is enforced on conversion
#[derive(Deserialize)]
struct IntervalBounds {
    start: usize,
    end: usize,
}

impl TryFrom<IntervalBounds> for GroundTruthInterval {
    type Error = AccordError;

    fn try_from(bounds: IntervalBounds) -> Result<Self> {
        Self::new(bounds.start, bounds.end)
    }
}

impl fmt::Display for GroundTruthInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for GroundTruthInterval {
    type Err = AccordError;

    /// Parses `start:end`
    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s.split_once(':').ok_or_else(|| {
            AccordError::invalid_input(format!("expected 'start:end', got '{}'", s))
        })?;
        let parse = |part: &str| {
            part.trim().parse::<usize>().map_err(|e| {
                AccordError::invalid_input(format!("bad interval bound '{}': {}", part, e))
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

/// Membership mask of the union of `truth` over `len` timesteps.
///
/// Intervals must already be validated against the series length.
pub(crate) fn truth_mask(truth: &[GroundTruthInterval], len: usize) -> Vec<bool> {
    let mut mask = vec![false; len];
    for interval in truth {
        let end = interval.end.min(len.saturating_sub(1));
        for slot in mask.iter_mut().take(end + 1).skip(interval.start) {
            *slot = true;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_channel() -> MultivariateSeries {
        MultivariateSeries::from_columns(vec![
            ("current".to_string(), vec![1.0, 2.0, 3.0]),
            ("rpm".to_string(), vec![10.0, 20.0, 30.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_keeps_channel_order() {
        let series = two_channel();
        assert_eq!(series.len(), 3);
        assert_eq!(series.channel_count(), 2);
        assert_eq!(series.channel_names(), &["current", "rpm"]);
        assert_eq!(series.value(2, 1), 30.0);
    }

    #[test]
    fn test_rejects_ragged_and_non_finite() {
        let ragged = MultivariateSeries::from_columns(vec![
            ("a".to_string(), vec![1.0, 2.0]),
            ("b".to_string(), vec![1.0]),
        ]);
        assert!(matches!(ragged, Err(AccordError::InvalidInput(_))));

        let nan = MultivariateSeries::from_columns(vec![("a".to_string(), vec![1.0, f64::NAN])]);
        assert!(matches!(nan, Err(AccordError::InvalidInput(_))));

        let dup = MultivariateSeries::from_columns(vec![
            ("a".to_string(), vec![1.0]),
            ("a".to_string(), vec![2.0]),
        ]);
        assert!(dup.is_err(), "Duplicate channel names must be rejected");
    }

    #[test]
    fn test_from_samples_matches_columns() {
        let series = MultivariateSeries::from_samples(
            vec!["current".to_string(), "rpm".to_string()],
            &[vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]],
        )
        .unwrap();
        assert_eq!(series, two_channel());
    }

    #[test]
    fn test_json_layout() {
        let json = r#"{"channels":[{"name":"current","values":[1,2,3]},{"name":"rpm","values":[10,20,30]}]}"#;
        let series = MultivariateSeries::from_json_str(json).unwrap();
        assert_eq!(series, two_channel());

        let back = serde_json::to_string(&series).unwrap();
        assert!(back.contains("\"current\""));
    }

    #[test]
    fn test_interval_parse_and_mask() {
        let interval: GroundTruthInterval = "2:4".parse().unwrap();
        assert_eq!(interval.span(), 3);
        assert!(interval.contains(4));
        assert!(!interval.contains(5));
        assert!("4:2".parse::<GroundTruthInterval>().is_err());
        assert!("x".parse::<GroundTruthInterval>().is_err());

        let mask = truth_mask(&[interval, GroundTruthInterval::new(0, 0).unwrap()], 6);
        assert_eq!(mask, vec![true, false, true, true, true, false]);
    }

    #[test]
    fn test_interval_deserialize_validates_bounds() {
        let interval: GroundTruthInterval =
            serde_json::from_str(r#"{"start": 3, "end": 7}"#).unwrap();
        assert_eq!(interval, GroundTruthInterval::new(3, 7).unwrap());
        assert_eq!(interval.span(), 5);

        let reversed = serde_json::from_str::<GroundTruthInterval>(r#"{"start": 7, "end": 3}"#);
        let err = reversed.unwrap_err().to_string();
        assert!(err.contains("after end"), "{}", err);

        let back = serde_json::to_string(&interval).unwrap();
        assert_eq!(back, r#"{"start":3,"end":7}"#);
    }
}
