//! Hand-off of region tables to a visualization renderer.
//!
//! Drawing is not done here. A [`RegionRenderer`] receives each region table
//! as a `(region, table)` pair; the bundled [`HeatmapSpecRenderer`] writes a
//! heatmap description that an external plotting tool can draw as-is.

use crate::core::pivot::PivotTable;
use crate::report::RegionStems;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Diverging colormap used for concentration changes.
pub const HEATMAP_COLORMAP: &str = "RdYlBu_r";

/// Errors raised by a renderer for one region.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize heatmap for {region}: {message}")]
    Serialize { region: String, message: String },
}

/// Receiver of finished region tables.
pub trait RegionRenderer {
    /// Render one region; returns the artifact path when one is produced.
    fn render(&self, region: &str, table: &PivotTable) -> Result<Option<PathBuf>, RenderError>;
}

/// Heatmap description of one region table.
#[derive(Debug, Clone, Serialize)]
pub struct HeatmapSpec<'a> {
    pub title: String,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub colorbar_label: &'static str,
    pub colormap: &'static str,
    pub center: f64,
    pub value_format: &'static str,
    pub rows: &'a [String],
    pub columns: &'a [String],
    /// Row-major cells; `null` marks "no value"
    pub values: Vec<&'a [Option<f64>]>,
    pub generated_at: String,
}

impl<'a> HeatmapSpec<'a> {
    pub fn new(region: &str, table: &'a PivotTable) -> Self {
        let values = (0..table.rows().len())
            .filter_map(|i| table.row_values(i))
            .collect();

        Self {
            title: format!("HbO Averages: {region}"),
            x_label: "Block",
            y_label: "Trial",
            colorbar_label: "HbO Concentration Change",
            colormap: HEATMAP_COLORMAP,
            center: 0.0,
            value_format: ".2e",
            rows: table.rows(),
            columns: table.columns(),
            values,
            generated_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Writes `heatmap_<region>.json` descriptions into a figures directory.
///
/// Regions whose safe names coincide get distinct files, numbered in the order
/// they are first rendered.
#[derive(Debug)]
pub struct HeatmapSpecRenderer {
    figures_dir: PathBuf,
    stems: Mutex<RegionStems>,
}

impl HeatmapSpecRenderer {
    pub fn new(figures_dir: impl Into<PathBuf>) -> Self {
        Self {
            figures_dir: figures_dir.into(),
            stems: Mutex::new(RegionStems::new()),
        }
    }

    pub fn figures_dir(&self) -> &Path {
        &self.figures_dir
    }

    /// Path of the artifact for a region.
    pub fn artifact_path(&self, region: &str) -> PathBuf {
        let stem = self
            .stems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stem(region);
        self.figures_dir.join(format!("heatmap_{stem}.json"))
    }
}

impl RegionRenderer for HeatmapSpecRenderer {
    fn render(&self, region: &str, table: &PivotTable) -> Result<Option<PathBuf>, RenderError> {
        let spec = HeatmapSpec::new(region, table);
        let json = serde_json::to_string_pretty(&spec).map_err(|e| RenderError::Serialize {
            region: region.to_string(),
            message: e.to_string(),
        })?;

        let path = self.artifact_path(region);
        std::fs::write(&path, json).map_err(|source| RenderError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(path))
    }
}

/// Renderer that accepts every table and produces nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

impl RegionRenderer for NoopRenderer {
    fn render(&self, _region: &str, _table: &PivotTable) -> Result<Option<PathBuf>, RenderError> {
        Ok(None)
    }
}
