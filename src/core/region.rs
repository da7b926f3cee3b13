//! Channel-to-region mapping.
//!
//! The mapping artifact is a JSON array of `{ "source", "detector", "region" }`
//! records. Channels are matched through the `S<source>_D<detector>` fragment
//! embedded in their label; indices are compared numerically, so `S01_D1`
//! and `S1_D1` resolve to the same entry.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

static SOURCE_DETECTOR: OnceLock<Regex> = OnceLock::new();

fn source_detector_pattern() -> &'static Regex {
    SOURCE_DETECTOR.get_or_init(|| Regex::new(r"S(\d+)_D(\d+)").expect("valid pattern"))
}

/// Errors loading the mapping artifact.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read mapping {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse mapping {path}: {message}")]
    Parse { path: String, message: String },
    #[error("mapping entry {index} has a zero source or detector index")]
    InvalidEntry { index: usize },
}

/// One record of the mapping artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMapEntry {
    pub source: u32,
    pub detector: u32,
    pub region: String,
}

impl ChannelMapEntry {
    pub fn new(source: u32, detector: u32, region: impl Into<String>) -> Self {
        Self {
            source,
            detector,
            region: region.into(),
        }
    }

    pub fn key(&self) -> String {
        channel_key(self.source, self.detector)
    }
}

/// A mapping key that was defined more than once with different regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingCollision {
    pub key: String,
    /// Region that was overridden
    pub previous: String,
    /// Region that is kept
    pub kept: String,
}

fn channel_key(source: u32, detector: u32) -> String {
    format!("S{source}_D{detector}")
}

/// Extract the normalized `S<n>_D<n>` key from a channel label.
pub fn source_detector_key(channel_label: &str) -> Option<String> {
    let captures = source_detector_pattern().captures(channel_label)?;
    let source: u32 = captures[1].parse().ok()?;
    let detector: u32 = captures[2].parse().ok()?;
    Some(channel_key(source, detector))
}

/// Read-only lookup from channel key to anatomical region.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegionMap {
    regions: HashMap<String, String>,
    collisions: Vec<MappingCollision>,
}

impl ChannelRegionMap {
    /// Build the lookup from mapping records.
    ///
    /// Later records win when a key repeats with a different region; every
    /// override is kept in [`ChannelRegionMap::collisions`].
    pub fn from_entries(entries: &[ChannelMapEntry]) -> Result<Self, MappingError> {
        let mut map = Self::default();

        for (index, entry) in entries.iter().enumerate() {
            if entry.source == 0 || entry.detector == 0 {
                return Err(MappingError::InvalidEntry { index });
            }
            let key = entry.key();
            if let Some(previous) = map.regions.insert(key.clone(), entry.region.clone()) {
                if previous != entry.region {
                    tracing::warn!(
                        "Mapping key {} redefined: '{}' replaced by '{}'",
                        key,
                        previous,
                        entry.region
                    );
                    map.collisions.push(MappingCollision {
                        key,
                        previous,
                        kept: entry.region.clone(),
                    });
                }
            }
        }

        Ok(map)
    }

    /// Parse a JSON mapping artifact.
    pub fn from_json(text: &str, origin: &str) -> Result<Self, MappingError> {
        let entries: Vec<ChannelMapEntry> =
            serde_json::from_str(text).map_err(|e| MappingError::Parse {
                path: origin.to_string(),
                message: e.to_string(),
            })?;
        Self::from_entries(&entries)
    }

    /// Load a JSON mapping artifact from disk.
    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: origin.clone(),
            source,
        })?;
        Self::from_json(&text, &origin)
    }

    /// Region of a channel label, or `None` if the channel is unmapped.
    pub fn region_for(&self, channel_label: &str) -> Option<&str> {
        let key = source_detector_key(channel_label)?;
        self.regions.get(&key).map(String::as_str)
    }

    /// Region of an already normalized key.
    pub fn region_for_key(&self, key: &str) -> Option<&str> {
        self.regions.get(key).map(String::as_str)
    }

    /// Distinct region names in lexicographic order.
    pub fn regions(&self) -> BTreeSet<&str> {
        self.regions.values().map(String::as_str).collect()
    }

    /// Number of distinct channel keys.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn collisions(&self) -> &[MappingCollision] {
        &self.collisions
    }
}
