//! Block segmentation of a recording using its event markers.
//!
//! Each marker opens a block that runs until the next marker (or the end of
//! the recording). Blocks are half-open sample intervals `[start, end)` and
//! together cover the whole recording without gaps or overlaps.

use crate::source::types::EventAnnotation;
use serde::{Deserialize, Serialize};

/// Label used when a recording carries no markers at all.
pub const ENTIRE_RECORDING: &str = "Entire_Recording";

/// Label of the block covering samples before the first marker.
///
/// The name is not reserved. A marker the converter labels `Pre_Event` shares
/// the label with this block, and pivot tables average the two like any other
/// repeated block label of a trial.
pub const PRE_EVENT: &str = "Pre_Event";

/// A contiguous window of samples associated with one condition label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Condition label
    pub label: String,
    /// First sample (inclusive)
    pub start: usize,
    /// One past the last sample
    pub end: usize,
}

impl Block {
    pub fn new(label: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }

    /// Number of samples in the block.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Zero-length blocks come from markers sharing a sample index.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if a sample index falls within this block.
    pub fn contains(&self, sample: usize) -> bool {
        sample >= self.start && sample < self.end
    }

    /// Duration of the block in seconds at the given sample rate.
    pub fn duration_secs(&self, sample_rate: f64) -> f64 {
        self.len() as f64 / sample_rate
    }
}

/// Partition `[0, n_samples)` into blocks.
///
/// Markers are ordered by sample index with a stable sort, so markers that
/// share an index keep the order the converter reported them in. Marker
/// indices past the end are clamped to `n_samples`.
pub fn segment_blocks(annotations: &[EventAnnotation], n_samples: usize) -> Vec<Block> {
    if annotations.is_empty() {
        return vec![Block::new(ENTIRE_RECORDING, 0, n_samples)];
    }

    let mut sorted: Vec<&EventAnnotation> = annotations.iter().collect();
    sorted.sort_by_key(|a| a.sample);

    let starts: Vec<usize> = sorted.iter().map(|a| a.sample.min(n_samples)).collect();

    let mut blocks = Vec::with_capacity(sorted.len() + 1);
    if starts[0] > 0 {
        blocks.push(Block::new(PRE_EVENT, 0, starts[0]));
    }

    for (index, annotation) in sorted.iter().enumerate() {
        let start = starts[index];
        let end = starts.get(index + 1).copied().unwrap_or(n_samples);
        let label = match annotation.label.as_deref() {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => format!("Block_{index}"),
        };
        blocks.push(Block::new(label, start, end));
    }

    blocks
}
