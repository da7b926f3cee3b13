//! Reader for concentration data already exported by the conversion service.
//!
//! Expected layout:
//!
//! ```json
//! {
//!   "channels": ["S1_D1 hbo", "S1_D1 hbr"],
//!   "sample_rate": 5.0,
//!   "data": [[0.1, 0.2, ...], [0.0, -0.1, ...]],
//!   "annotations": [{ "sample": 0, "label": "Rest" }, { "sample": 50 }]
//! }
//! ```

use super::types::{ConvertedRecording, EventAnnotation, RawHemoSeries};
use super::{HemoConverter, SourceError};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct HemoExport {
    channels: Vec<String>,
    sample_rate: f64,
    data: Vec<Vec<f64>>,
    #[serde(default)]
    annotations: Vec<EventAnnotation>,
}

/// Loads `.json` concentration exports.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExportConverter;

impl JsonExportConverter {
    pub fn new() -> Self {
        Self
    }

    /// Parse an export from an in-memory string.
    pub fn parse(text: &str, origin: &str) -> Result<ConvertedRecording, SourceError> {
        let export: HemoExport = serde_json::from_str(text).map_err(|e| SourceError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;

        let series = RawHemoSeries::new(export.channels, export.sample_rate, export.data)?;
        Ok(ConvertedRecording {
            series,
            annotations: export.annotations,
        })
    }
}

impl HemoConverter for JsonExportConverter {
    fn convert(&self, path: &Path) -> Result<ConvertedRecording, SourceError> {
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: origin.clone(),
            source,
        })?;
        Self::parse(&text, &origin)
    }
}
