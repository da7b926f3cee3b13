//! Core aggregation for the fNIRS toolkit.
//!
//! This module contains:
//! - Trial identity derived from file names
//! - Block segmentation from event annotations
//! - Per-channel block statistics
//! - Global block ordering across files
//! - Channel-to-region mapping
//! - Pivot tables at channel and region level

pub mod order;
pub mod pivot;
pub mod region;
pub mod segment;
pub mod stats;
pub mod trial;

// Re-export commonly used types
pub use order::{distinct_block_labels, GlobalBlockOrder};
pub use pivot::{build_detailed_table, build_region_tables, PivotTable, RegionRollup, RegionTable};
pub use region::{source_detector_key, ChannelMapEntry, ChannelRegionMap, MappingError};
pub use segment::{segment_blocks, Block, ENTIRE_RECORDING, PRE_EVENT};
pub use stats::{measure_block, measure_blocks, summarize, ChannelMeasurement, HbType};
pub use trial::trial_id;
