//! Converted hemoglobin recordings as handed over by the conversion service.
//!
//! These types are produced once per input file and consumed read-only by the
//! aggregation core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a converted series does not have a consistent shape.
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),
    #[error("{labels} channel labels but {rows} data rows")]
    ChannelCountMismatch { labels: usize, rows: usize },
    #[error("channel '{channel}' has {found} samples, expected {expected}")]
    RaggedChannel {
        channel: String,
        expected: usize,
        found: usize,
    },
}

/// A per-channel hemoglobin concentration time series.
///
/// Shape is `[channels × samples]`; every channel holds the same number of
/// samples. Construct through [`RawHemoSeries::new`] so the shape is checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHemoSeries {
    channel_names: Vec<String>,
    sample_rate: f64,
    data: Vec<Vec<f64>>,
}

impl RawHemoSeries {
    /// Validate and wrap a converted series.
    pub fn new(
        channel_names: Vec<String>,
        sample_rate: f64,
        data: Vec<Vec<f64>>,
    ) -> Result<Self, SeriesError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(SeriesError::InvalidSampleRate(sample_rate));
        }
        if channel_names.len() != data.len() {
            return Err(SeriesError::ChannelCountMismatch {
                labels: channel_names.len(),
                rows: data.len(),
            });
        }
        let expected = data.first().map(Vec::len).unwrap_or(0);
        for (name, row) in channel_names.iter().zip(&data) {
            if row.len() != expected {
                return Err(SeriesError::RaggedChannel {
                    channel: name.clone(),
                    expected,
                    found: row.len(),
                });
            }
        }

        Ok(Self {
            channel_names,
            sample_rate,
            data,
        })
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Sampling frequency in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn n_channels(&self) -> usize {
        self.channel_names.len()
    }

    pub fn n_samples(&self) -> usize {
        self.data.first().map(Vec::len).unwrap_or(0)
    }

    /// All samples of one channel.
    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.data.get(index).map(Vec::as_slice)
    }

    /// Iterate `(label, samples)` pairs in channel order.
    pub fn channels(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.channel_names
            .iter()
            .map(String::as_str)
            .zip(self.data.iter().map(Vec::as_slice))
    }
}

/// A timestamped event marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAnnotation {
    /// Sample index at which the event starts
    pub sample: usize,
    /// Condition label, if the converter could resolve one
    #[serde(default)]
    pub label: Option<String>,
}

impl EventAnnotation {
    pub fn new(sample: usize, label: impl Into<String>) -> Self {
        Self {
            sample,
            label: Some(label.into()),
        }
    }

    /// A marker whose label could not be resolved.
    pub fn unlabeled(sample: usize) -> Self {
        Self {
            sample,
            label: None,
        }
    }
}

/// Output of the conversion service for one input file.
#[derive(Debug, Clone)]
pub struct ConvertedRecording {
    pub series: RawHemoSeries,
    pub annotations: Vec<EventAnnotation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_shape_accessors() {
        let series = RawHemoSeries::new(
            vec!["S1_D1 hbo".into(), "S1_D1 hbr".into()],
            5.0,
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap();

        assert_eq!(series.n_channels(), 2);
        assert_eq!(series.n_samples(), 3);
        assert_eq!(series.channel(1), Some(&[4.0, 5.0, 6.0][..]));
        assert!(series.channel(2).is_none());
    }

    #[test]
    fn test_series_rejects_bad_rate() {
        let err = RawHemoSeries::new(vec![], 0.0, vec![]).unwrap_err();
        assert_eq!(err, SeriesError::InvalidSampleRate(0.0));

        assert!(RawHemoSeries::new(vec![], f64::NAN, vec![]).is_err());
    }

    #[test]
    fn test_series_rejects_ragged_rows() {
        let err = RawHemoSeries::new(
            vec!["a".into(), "b".into()],
            10.0,
            vec![vec![1.0, 2.0], vec![1.0]],
        )
        .unwrap_err();

        assert!(matches!(err, SeriesError::RaggedChannel { found: 1, .. }));
    }

    #[test]
    fn test_series_rejects_label_count_mismatch() {
        let err = RawHemoSeries::new(vec!["a".into()], 10.0, vec![]).unwrap_err();
        assert_eq!(err, SeriesError::ChannelCountMismatch { labels: 1, rows: 0 });
    }
}
