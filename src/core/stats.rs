//! Per-block channel statistics.
//!
//! For every (block, channel) pair of a recording this module produces one
//! [`ChannelMeasurement`] holding the mean, population standard deviation and
//! block duration. Blocks without samples yield "no value" (`None`) rather
//! than a numeric placeholder.

use crate::core::segment::Block;
use crate::source::types::RawHemoSeries;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;

/// Hemoglobin component carried by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HbType {
    /// Oxygenated hemoglobin
    HbO,
    /// Deoxygenated hemoglobin
    HbR,
    Unknown,
}

impl HbType {
    /// Classify a channel by its label.
    ///
    /// Case-insensitive substring test: `hbo` wins over `hbr`, anything else is
    /// [`HbType::Unknown`]. The rest of the label is not validated.
    pub fn classify(channel_label: &str) -> Self {
        let lower = channel_label.to_lowercase();
        if lower.contains("hbo") {
            HbType::HbO
        } else if lower.contains("hbr") {
            HbType::HbR
        } else {
            HbType::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HbType::HbO => "HbO",
            HbType::HbR => "HbR",
            HbType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for HbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one channel over one block of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMeasurement {
    #[serde(rename = "Trial")]
    pub trial: String,
    #[serde(rename = "Block")]
    pub block: String,
    #[serde(rename = "Channel")]
    pub channel: String,
    #[serde(rename = "HbType")]
    pub hb_type: HbType,
    /// Mean concentration change; `None` for an empty block
    #[serde(rename = "Mean_Value")]
    pub mean: Option<f64>,
    /// Population standard deviation; `None` for an empty block
    #[serde(rename = "Std_Value")]
    pub std: Option<f64>,
    #[serde(rename = "Block_Duration_s")]
    pub duration_secs: f64,
}

/// Mean and population standard deviation of a sample window.
///
/// Returns `None` for an empty window or when the result is not finite.
pub fn summarize(samples: &[f64]) -> Option<(f64, f64)> {
    if samples.is_empty() {
        return None;
    }
    let mean = samples.iter().mean();
    let std = samples.iter().population_std_dev();
    if mean.is_finite() && std.is_finite() {
        Some((mean, std))
    } else {
        None
    }
}

/// Compute one measurement per channel for a single block.
pub fn measure_block(trial: &str, series: &RawHemoSeries, block: &Block) -> Vec<ChannelMeasurement> {
    let n_samples = series.n_samples();
    let start = block.start.min(n_samples);
    let end = block.end.clamp(start, n_samples);
    let duration_secs = block.duration_secs(series.sample_rate());

    series
        .channels()
        .map(|(label, samples)| {
            let summary = summarize(&samples[start..end]);
            ChannelMeasurement {
                trial: trial.to_string(),
                block: block.label.clone(),
                channel: label.to_string(),
                hb_type: HbType::classify(label),
                mean: summary.map(|(mean, _)| mean),
                std: summary.map(|(_, std)| std),
                duration_secs,
            }
        })
        .collect()
}

/// Compute measurements for every block, in block order then channel order.
pub fn measure_blocks(
    trial: &str,
    series: &RawHemoSeries,
    blocks: &[Block],
) -> Vec<ChannelMeasurement> {
    blocks
        .iter()
        .flat_map(|block| measure_block(trial, series, block))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::segment::segment_blocks;
    use crate::source::types::EventAnnotation;

    fn two_channel_series(n_samples: usize) -> RawHemoSeries {
        let hbo: Vec<f64> = (0..n_samples).map(|i| i as f64).collect();
        let hbr: Vec<f64> = (0..n_samples).map(|i| -(i as f64)).collect();
        RawHemoSeries::new(
            vec!["S1_D1 hbo".into(), "S1_D1 hbr".into()],
            5.0,
            vec![hbo, hbr],
        )
        .unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(HbType::classify("S1_D1 hbo"), HbType::HbO);
        assert_eq!(HbType::classify("S3_D2 HbR"), HbType::HbR);
        assert_eq!(HbType::classify("S3_D2 760"), HbType::Unknown);
        assert_eq!(HbType::classify("HBO"), HbType::HbO);
    }

    #[test]
    fn test_summarize() {
        let (mean, std) = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((mean - 5.0).abs() < 1e-9);
        assert!((std - 2.0).abs() < 1e-9);

        let (mean, std) = summarize(&[3.0]).unwrap();
        assert!((mean - 3.0).abs() < 1e-12);
        assert!(std.abs() < 1e-12);
    }

    #[test]
    fn test_summarize_empty_and_nan() {
        assert_eq!(summarize(&[]), None);
        assert_eq!(summarize(&[1.0, f64::NAN]), None);
    }

    #[test]
    fn test_three_block_example() {
        let series = two_channel_series(200);
        let annotations = vec![
            EventAnnotation::new(0, "A"),
            EventAnnotation::new(50, "B"),
            EventAnnotation::new(120, "C"),
        ];
        let blocks = segment_blocks(&annotations, series.n_samples());
        let rows = measure_blocks("CTRL_P01", &series, &blocks);

        assert_eq!(rows.len(), 6);
        assert_eq!(rows.iter().filter(|r| r.hb_type == HbType::HbO).count(), 3);
        assert_eq!(rows.iter().filter(|r| r.hb_type == HbType::HbR).count(), 3);

        let durations: Vec<f64> = rows.iter().step_by(2).map(|r| r.duration_secs).collect();
        assert_eq!(durations, vec![10.0, 14.0, 16.0]);

        // samples 50..120 of 0,1,2,... average to 84.5
        assert_eq!(rows[2].block, "B");
        assert!((rows[2].mean.unwrap() - 84.5).abs() < 1e-9);
        assert!((rows[3].mean.unwrap() + 84.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_block_has_no_value() {
        let series = two_channel_series(10);
        let rows = measure_block("t", &series, &Block::new("Z", 4, 4));

        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row.mean, None);
            assert_eq!(row.std, None);
            assert_eq!(row.duration_secs, 0.0);
        }
    }
}
