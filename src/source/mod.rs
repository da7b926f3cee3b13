//! Boundary to the hemodynamic conversion service.
//!
//! Reading the recording format, optical-density conversion, motion
//! correction, filtering and the concentration conversion itself all happen
//! behind [`HemoConverter`]. The aggregation core only ever sees the
//! [`ConvertedRecording`] it returns.

pub mod json;
pub mod types;

use std::path::Path;
use thiserror::Error;

// Re-export commonly used types
pub use json::JsonExportConverter;
pub use types::{ConvertedRecording, EventAnnotation, RawHemoSeries, SeriesError};

/// Errors that can occur while converting one input file.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("malformed series: {0}")]
    Series(#[from] SeriesError),
    #[error("conversion failed: {0}")]
    Conversion(String),
}

/// Anything that turns an input file into converted concentration data.
///
/// Implementations must be shareable across worker threads; extraction may
/// run one file per worker.
pub trait HemoConverter: Sync {
    fn convert(&self, path: &Path) -> Result<ConvertedRecording, SourceError>;
}

impl<F> HemoConverter for F
where
    F: Fn(&Path) -> Result<ConvertedRecording, SourceError> + Sync,
{
    fn convert(&self, path: &Path) -> Result<ConvertedRecording, SourceError> {
        self(path)
    }
}
