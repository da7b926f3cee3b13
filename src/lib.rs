//! fNIRS Toolkit - block-segmented hemoglobin aggregation for research.
//!
//! This library turns a directory of converted fNIRS recordings into
//! per-block summary tables at channel level and at anatomical-region level.
//!
//! # Guarantees
//!
//! - **Full coverage**: blocks of one recording tile `[0, n_samples)` exactly
//! - **Stable columns**: block order follows first appearance across files,
//!   independent of how many extraction workers run
//! - **No invented zeros**: a missing trial/block combination stays empty
//! - **Partial failure**: a file that cannot be read is reported and skipped
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        fNIRS Toolkit                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Source    │──▶│  Segment    │──▶│   Stats     │       │
//! │  │ (converter) │   │  (blocks)   │   │ (per block) │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                                             │               │
//! │                                             ▼               │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Render    │◀──│   Report    │◀──│   Pivot     │       │
//! │  │ (heatmaps)  │   │   (CSV)     │   │ (+ regions) │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use fnirs_toolkit::{run, source::JsonExportConverter, Config, NoopRenderer};
//!
//! let config = Config::default();
//! let converter = JsonExportConverter::new();
//! let files = run::discover_inputs("recordings".as_ref(), &config.input_extension)
//!     .expect("no recordings");
//!
//! let report = run::Pipeline::new(&converter)
//!     .with_workers(4)
//!     .run(&files, None, &config.layout(), &NoopRenderer)
//!     .expect("run failed");
//! println!("{} trials", report.analysis.trials.len());
//! ```

pub mod config;
pub mod core;
pub mod ledger;
pub mod render;
pub mod report;
pub mod run;
pub mod source;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, ConfigOverrides, OutputLayout};
pub use core::{
    segment_blocks, trial_id, Block, ChannelMeasurement, ChannelRegionMap, GlobalBlockOrder,
    HbType, PivotTable,
};
pub use ledger::{RunLedger, RunStats, SharedRunLedger};
pub use render::{HeatmapSpecRenderer, NoopRenderer, RegionRenderer};
pub use run::{MappingStatus, Pipeline, RunError, RunReport};
pub use source::{EventAnnotation, HemoConverter, RawHemoSeries};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
