//! Counters for one run, safe to update from extraction workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Statistics for the current run.
#[derive(Debug)]
pub struct RunLedger {
    run_id: String,
    /// Input files handed to the converter
    files_seen: AtomicU64,
    files_succeeded: AtomicU64,
    files_failed: AtomicU64,
    /// Channel measurements extracted
    measurements: AtomicU64,
    region_tables: AtomicU64,
    figures_rendered: AtomicU64,
    started_at: DateTime<Utc>,
}

impl RunLedger {
    /// Create a new ledger.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            files_seen: AtomicU64::new(0),
            files_succeeded: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            measurements: AtomicU64::new(0),
            region_tables: AtomicU64::new(0),
            figures_rendered: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record_file_seen(&self) {
        self.files_seen.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully extracted file and its measurement count.
    pub fn record_file_succeeded(&self, measurements: u64) {
        self.files_succeeded.fetch_add(1, Ordering::Relaxed);
        self.measurements.fetch_add(measurements, Ordering::Relaxed);
    }

    pub fn record_file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_region_table(&self) {
        self.region_tables.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_figure_rendered(&self) {
        self.figures_rendered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> RunStats {
        RunStats {
            run_id: self.run_id.clone(),
            files_seen: self.files_seen.load(Ordering::Relaxed),
            files_succeeded: self.files_succeeded.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            measurements: self.measurements.load(Ordering::Relaxed),
            region_tables: self.region_tables.load(Ordering::Relaxed),
            figures_rendered: self.figures_rendered.load(Ordering::Relaxed),
            started_at: self.started_at,
            duration_ms: (Utc::now() - self.started_at).num_milliseconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Run Statistics ({}):\n\
             - Files processed: {} of {}\n\
             - Files failed: {}\n\
             - Measurements extracted: {}\n\
             - Region tables: {}\n\
             - Figures handed off: {}\n\
             - Duration: {} ms",
            stats.run_id,
            stats.files_succeeded,
            stats.files_seen,
            stats.files_failed,
            stats.measurements,
            stats.region_tables,
            stats.figures_rendered,
            stats.duration_ms
        )
    }

    /// Add this run to the cumulative totals stored at `path`.
    pub fn append_to(&self, path: &Path) -> Result<CumulativeStats, std::io::Error> {
        let mut totals = CumulativeStats::load(path)?.unwrap_or_default();
        totals.absorb(&self.stats());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&totals).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;

        Ok(totals)
    }
}

impl Default for RunLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one run's statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: String,
    pub files_seen: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,
    pub measurements: u64,
    pub region_tables: u64,
    pub figures_rendered: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Totals across every run, as persisted on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeStats {
    pub runs: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,
    pub measurements: u64,
    pub region_tables: u64,
    pub figures_rendered: u64,
    pub last_run_id: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CumulativeStats {
    /// Load totals; `Ok(None)` when nothing has been persisted yet.
    pub fn load(path: &Path) -> Result<Option<Self>, std::io::Error> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let totals = serde_json::from_str(&content).map_err(std::io::Error::other)?;
        Ok(Some(totals))
    }

    fn absorb(&mut self, run: &RunStats) {
        self.runs += 1;
        self.files_succeeded += run.files_succeeded;
        self.files_failed += run.files_failed;
        self.measurements += run.measurements;
        self.region_tables += run.region_tables;
        self.figures_rendered += run.figures_rendered;
        self.last_run_id = Some(run.run_id.clone());
        self.last_updated = Some(Utc::now());
    }
}

/// Default location of the cumulative ledger under a data directory.
pub fn ledger_path(data_path: &Path) -> PathBuf {
    data_path.join("ledger.json")
}

/// Thread-safe shared run ledger.
pub type SharedRunLedger = Arc<RunLedger>;

/// Create a new shared run ledger.
pub fn create_shared_ledger() -> SharedRunLedger {
    Arc::new(RunLedger::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_counting() {
        let ledger = RunLedger::new();

        ledger.record_file_seen();
        ledger.record_file_seen();
        ledger.record_file_succeeded(12);
        ledger.record_file_failed();
        ledger.record_region_table();

        let stats = ledger.stats();
        assert_eq!(stats.files_seen, 2);
        assert_eq!(stats.files_succeeded, 1);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.measurements, 12);
        assert_eq!(stats.region_tables, 1);
        assert_eq!(stats.run_id, ledger.run_id());
    }

    #[test]
    fn test_counting_across_threads() {
        let ledger = create_shared_ledger();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let ledger = Arc::clone(&ledger);
                scope.spawn(move || {
                    for _ in 0..25 {
                        ledger.record_file_succeeded(2);
                    }
                });
            }
        });

        let stats = ledger.stats();
        assert_eq!(stats.files_succeeded, 100);
        assert_eq!(stats.measurements, 200);
    }

    #[test]
    fn test_summary_format() {
        let ledger = RunLedger::new();
        let summary = ledger.summary();

        assert!(summary.contains("Files processed"));
        assert!(summary.contains("Region tables"));
        assert!(summary.contains(ledger.run_id()));
    }

    #[test]
    fn test_cumulative_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = ledger_path(dir.path());
        assert!(CumulativeStats::load(&path).unwrap().is_none());

        let first = RunLedger::new();
        first.record_file_succeeded(10);
        first.append_to(&path).unwrap();

        let second = RunLedger::new();
        second.record_file_succeeded(5);
        second.record_file_failed();
        let totals = second.append_to(&path).unwrap();

        assert_eq!(totals.runs, 2);
        assert_eq!(totals.files_succeeded, 2);
        assert_eq!(totals.files_failed, 1);
        assert_eq!(totals.measurements, 15);
        assert_eq!(totals.last_run_id.as_deref(), Some(second.run_id()));
        assert_eq!(CumulativeStats::load(&path).unwrap(), Some(totals));
    }
}
