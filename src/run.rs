//! Run orchestration.
//!
//! A run has three phases:
//!
//! 1. **Extraction**: every input file is converted and measured
//!    independently, optionally on a pool of workers. Each file yields a
//!    [`FileOutcome`]; failures are values, not early returns.
//! 2. **Reduction**: outcomes are replayed in input order on one thread. This
//!    is the only place the [`GlobalBlockOrder`] is extended, so column order
//!    does not depend on worker scheduling.
//! 3. **Output**: tables are persisted and region tables are handed to a
//!    [`RegionRenderer`].

use crate::config::{ConfigError, OutputLayout};
use crate::core::order::{distinct_block_labels, GlobalBlockOrder};
use crate::core::pivot::{build_detailed_table, build_region_tables, PivotTable, RegionRollup};
use crate::core::region::{ChannelRegionMap, MappingError};
use crate::core::segment::segment_blocks;
use crate::core::stats::{measure_blocks, ChannelMeasurement};
use crate::core::trial::trial_id;
use crate::ledger::{create_shared_ledger, RunLedger, RunStats, SharedRunLedger};
use crate::render::RegionRenderer;
use crate::report::{
    write_measurements, write_table, RegionStems, ReportError, WrittenTables,
    DETAILED_TABLE_FILE, MEASUREMENTS_FILE,
};
use crate::source::HemoConverter;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal run-level errors.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no input files with extension .{extension} in {dir}")]
    NoInputFiles { dir: String, extension: String },
    #[error("no files were successfully processed ({failed} failed)")]
    NoUsableData { failed: usize },
    #[error("cannot list input directory {dir}: {source}")]
    InputDir {
        dir: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot prepare output directories: {0}")]
    Output(#[from] ConfigError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Measurements extracted from one input file.
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub path: PathBuf,
    pub trial: String,
    pub measurements: Vec<ChannelMeasurement>,
    /// Distinct block labels in the order the blocks occur
    pub block_labels: Vec<String>,
}

/// An input file that could not be converted.
#[derive(Debug, Clone)]
pub struct FailedFile {
    pub path: PathBuf,
    pub trial: String,
    pub reason: String,
}

/// Result of extracting one file.
#[derive(Debug, Clone)]
pub enum FileOutcome {
    Processed(ProcessedFile),
    Failed(FailedFile),
}

/// Convert, segment and measure a single file.
pub fn process_file<C: HemoConverter + ?Sized>(converter: &C, path: &Path) -> FileOutcome {
    let trial = trial_id(path);
    let failed = |reason: String| {
        FileOutcome::Failed(FailedFile {
            path: path.to_path_buf(),
            trial: trial.clone(),
            reason,
        })
    };

    let recording = match converter.convert(path) {
        Ok(recording) => recording,
        Err(e) => return failed(e.to_string()),
    };
    if recording.series.n_channels() == 0 {
        return failed("recording has no channels".to_string());
    }

    let blocks = segment_blocks(&recording.annotations, recording.series.n_samples());
    let measurements = measure_blocks(&trial, &recording.series, &blocks);

    FileOutcome::Processed(ProcessedFile {
        path: path.to_path_buf(),
        trial: trial.clone(),
        measurements,
        block_labels: distinct_block_labels(&blocks),
    })
}

fn process_and_record<C: HemoConverter + ?Sized>(
    converter: &C,
    path: &Path,
    ledger: &RunLedger,
) -> FileOutcome {
    ledger.record_file_seen();
    let outcome = process_file(converter, path);
    match &outcome {
        FileOutcome::Processed(file) => {
            ledger.record_file_succeeded(file.measurements.len() as u64)
        }
        FileOutcome::Failed(_) => ledger.record_file_failed(),
    }
    outcome
}

/// Extract every file; outcomes come back in input order.
pub fn extract_all<C: HemoConverter + ?Sized>(
    converter: &C,
    files: &[PathBuf],
    workers: usize,
    ledger: &RunLedger,
) -> Vec<FileOutcome> {
    let workers = workers.clamp(1, files.len().max(1));
    if workers == 1 {
        return files
            .iter()
            .map(|path| process_and_record(converter, path, ledger))
            .collect();
    }

    tracing::debug!("Extracting {} files on {} workers", files.len(), workers);

    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, &Path)>();
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, FileOutcome)>();
    for (index, path) in files.iter().enumerate() {
        // Receiver is alive until the end of this function.
        let _ = job_tx.send((index, path.as_path()));
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                for (index, path) in job_rx.iter() {
                    let outcome = process_and_record(converter, path, ledger);
                    if done_tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(done_tx);

    let mut slots: Vec<Option<FileOutcome>> = files.iter().map(|_| None).collect();
    for (index, outcome) in done_rx.iter() {
        slots[index] = Some(outcome);
    }
    slots.into_iter().flatten().collect()
}

/// Per-trial line of the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSummary {
    pub trial: String,
    pub file: PathBuf,
    pub status: TrialStatus,
    pub measurement_count: usize,
    pub block_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialStatus {
    Succeeded,
    Failed(String),
}

impl TrialSummary {
    pub fn succeeded(&self) -> bool {
        self.status == TrialStatus::Succeeded
    }
}

/// Everything computed from the inputs, before anything is written.
#[derive(Debug, Clone)]
pub struct RunAnalysis {
    pub trials: Vec<TrialSummary>,
    pub measurements: Vec<ChannelMeasurement>,
    pub block_order: GlobalBlockOrder,
    pub detailed: PivotTable,
    /// `None` when no channel mapping was available
    pub regions: Option<RegionRollup>,
}

impl RunAnalysis {
    pub fn succeeded_count(&self) -> usize {
        self.trials.iter().filter(|t| t.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.trials.len() - self.succeeded_count()
    }

    pub fn region_table_count(&self) -> usize {
        self.regions.as_ref().map_or(0, |r| r.tables.len())
    }
}

/// Replay outcomes in input order and build every table.
pub fn reduce(
    outcomes: Vec<FileOutcome>,
    mapping: Option<&ChannelRegionMap>,
) -> Result<RunAnalysis, RunError> {
    let mut block_order = GlobalBlockOrder::new();
    let mut measurements = Vec::new();
    let mut trials = Vec::with_capacity(outcomes.len());
    let mut seen_trials = HashSet::new();

    for outcome in outcomes {
        match outcome {
            FileOutcome::Processed(file) => {
                if !seen_trials.insert(file.trial.clone()) {
                    tracing::warn!(
                        "Trial {} appears in more than one file; rows will be merged",
                        file.trial
                    );
                }
                block_order.observe_file(&file.block_labels);
                tracing::info!(
                    "Processed {} ({} measurements, {} blocks)",
                    file.trial,
                    file.measurements.len(),
                    file.block_labels.len()
                );

                trials.push(TrialSummary {
                    trial: file.trial,
                    file: file.path,
                    status: TrialStatus::Succeeded,
                    measurement_count: file.measurements.len(),
                    block_count: file.block_labels.len(),
                });
                measurements.extend(file.measurements);
            }
            FileOutcome::Failed(file) => {
                tracing::warn!("Failed to process {}: {}", file.path.display(), file.reason);
                trials.push(TrialSummary {
                    trial: file.trial,
                    file: file.path,
                    status: TrialStatus::Failed(file.reason),
                    measurement_count: 0,
                    block_count: 0,
                });
            }
        }
    }

    if !trials.iter().any(TrialSummary::succeeded) {
        return Err(RunError::NoUsableData {
            failed: trials.len(),
        });
    }

    tracing::info!(
        "Found {} unique blocks across all files: {}",
        block_order.len(),
        block_order.labels().join(", ")
    );

    let detailed = build_detailed_table(&measurements, &block_order);

    let regions = mapping.map(|map| {
        let rollup = build_region_tables(&measurements, map, &block_order);
        if rollup.unmapped_measurements > 0 {
            tracing::warn!(
                "{} measurements with unmapped channels excluded from region tables",
                rollup.unmapped_measurements
            );
        } else {
            tracing::info!("All channels mapped to regions");
        }
        rollup
    });

    Ok(RunAnalysis {
        trials,
        measurements,
        block_order,
        detailed,
        regions,
    })
}

/// State of the channel mapping for a run.
#[derive(Debug, Clone)]
pub enum MappingStatus {
    NotConfigured,
    Missing(PathBuf),
    Invalid { path: PathBuf, reason: String },
    Loaded { path: PathBuf, map: ChannelRegionMap },
}

impl MappingStatus {
    /// Load the mapping if one is configured; problems disable region output.
    pub fn resolve(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return MappingStatus::NotConfigured;
        };
        if !path.exists() {
            tracing::warn!("Channel mapping file not found: {}", path.display());
            return MappingStatus::Missing(path.to_path_buf());
        }

        match ChannelRegionMap::load(path) {
            Ok(map) => {
                tracing::info!(
                    "Loaded {} channel mappings from {}",
                    map.len(),
                    path.display()
                );
                MappingStatus::Loaded {
                    path: path.to_path_buf(),
                    map,
                }
            }
            Err(e) => {
                tracing::warn!("Ignoring channel mapping: {}", e);
                MappingStatus::Invalid {
                    path: path.to_path_buf(),
                    reason: describe_mapping_error(&e),
                }
            }
        }
    }

    pub fn map(&self) -> Option<&ChannelRegionMap> {
        match self {
            MappingStatus::Loaded { map, .. } => Some(map),
            _ => None,
        }
    }
}

fn describe_mapping_error(error: &MappingError) -> String {
    match error {
        MappingError::Io { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

/// List input files with the given extension, sorted by file name.
pub fn discover_inputs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, RunError> {
    let extension = extension.trim_start_matches('.');
    let entries = std::fs::read_dir(dir).map_err(|source| RunError::InputDir {
        dir: dir.display().to_string(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    if files.is_empty() {
        return Err(RunError::NoInputFiles {
            dir: dir.display().to_string(),
            extension: extension.to_string(),
        });
    }
    Ok(files)
}

/// Everything a caller needs to summarize a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub analysis: RunAnalysis,
    pub written: WrittenTables,
    /// Renderer artifacts per region
    pub figures: Vec<(String, PathBuf)>,
    /// Regions the renderer failed on, with the reason
    pub render_failures: Vec<(String, String)>,
    /// Regions whose table could not be saved; these are not rendered
    pub region_failures: Vec<(String, String)>,
    pub stats: RunStats,
}

impl RunReport {
    pub fn region_table_count(&self) -> usize {
        self.written.regions.len()
    }
}

/// Drives extraction, reduction and output for a set of input files.
pub struct Pipeline<'a, C: HemoConverter + ?Sized> {
    converter: &'a C,
    workers: usize,
    ledger: SharedRunLedger,
}

impl<'a, C: HemoConverter + ?Sized> Pipeline<'a, C> {
    pub fn new(converter: &'a C) -> Self {
        Self {
            converter,
            workers: 1,
            ledger: create_shared_ledger(),
        }
    }

    /// Number of extraction workers; 1 keeps extraction sequential.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_ledger(mut self, ledger: SharedRunLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn ledger(&self) -> &SharedRunLedger {
        &self.ledger
    }

    /// Extract and reduce without writing anything.
    pub fn analyze(
        &self,
        files: &[PathBuf],
        mapping: Option<&ChannelRegionMap>,
    ) -> Result<RunAnalysis, RunError> {
        let outcomes = extract_all(self.converter, files, self.workers, &self.ledger);
        reduce(outcomes, mapping)
    }

    /// Full run: analyze, persist tables and hand region tables to `renderer`.
    ///
    /// Failing to save the measurement or detailed table ends the run. A region
    /// table that cannot be saved is reported in
    /// [`RunReport::region_failures`] and the other regions carry on.
    pub fn run(
        &self,
        files: &[PathBuf],
        mapping: Option<&ChannelRegionMap>,
        layout: &OutputLayout,
        renderer: &dyn RegionRenderer,
    ) -> Result<RunReport, RunError> {
        let analysis = self.analyze(files, mapping)?;
        layout.ensure_directories()?;

        let mut written = WrittenTables::default();

        let path = layout.data_dir.join(MEASUREMENTS_FILE);
        write_measurements(&path, &analysis.measurements)?;
        written.measurements = Some(path);

        let path = layout.data_dir.join(DETAILED_TABLE_FILE);
        write_table(&path, &analysis.detailed)?;
        let (rows, cols) = analysis.detailed.shape();
        tracing::info!(
            "Saved detailed pivot table ({} rows x {} columns) to {}",
            rows,
            cols,
            path.display()
        );
        written.detailed = Some(path);

        let mut figures = Vec::new();
        let mut render_failures = Vec::new();
        let mut region_failures = Vec::new();

        if let Some(rollup) = &analysis.regions {
            let mut stems = RegionStems::new();
            for region in &rollup.tables {
                let path = layout.data_dir.join(stems.table_file(&region.region));
                if let Err(e) = write_table(&path, &region.table) {
                    tracing::error!("Failed to save region {}: {}", region.region, e);
                    region_failures.push((region.region.clone(), e.to_string()));
                    continue;
                }
                self.ledger.record_region_table();

                let (rows, cols) = region.table.shape();
                tracing::info!(
                    "Saved region {} ({} trials x {} blocks, {} channels averaged) to {}",
                    region.region,
                    rows,
                    cols,
                    region.channel_count,
                    path.display()
                );
                written.regions.push((region.region.clone(), path));

                match renderer.render(&region.region, &region.table) {
                    Ok(Some(path)) => {
                        self.ledger.record_figure_rendered();
                        figures.push((region.region.clone(), path));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!("Rendering failed for {}: {}", region.region, e);
                        render_failures.push((region.region.clone(), e.to_string()));
                    }
                }
            }
        } else {
            tracing::info!("No channel mapping; skipping region tables");
        }

        Ok(RunReport {
            analysis,
            written,
            figures,
            render_failures,
            region_failures,
            stats: self.ledger.stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::region::ChannelMapEntry;
    use crate::source::{ConvertedRecording, EventAnnotation, RawHemoSeries, SourceError};

    fn recording(labels: &[(usize, &str)], n_samples: usize) -> ConvertedRecording {
        let hbo: Vec<f64> = (0..n_samples).map(|i| i as f64).collect();
        let hbr = vec![0.0; n_samples];
        ConvertedRecording {
            series: RawHemoSeries::new(
                vec!["S1_D1 hbo".into(), "S1_D1 hbr".into()],
                5.0,
                vec![hbo, hbr],
            )
            .unwrap(),
            annotations: labels
                .iter()
                .map(|(s, l)| EventAnnotation::new(*s, *l))
                .collect(),
        }
    }

    /// Files named `*_bad*` fail; the others get blocks from their stem.
    fn fake_converter(path: &Path) -> Result<ConvertedRecording, SourceError> {
        let name = path.file_stem().unwrap().to_string_lossy().into_owned();
        if name.contains("bad") {
            return Err(SourceError::Conversion("corrupt".into()));
        }
        if name.ends_with("AB") {
            Ok(recording(&[(0, "A"), (10, "B")], 20))
        } else {
            Ok(recording(&[(0, "B"), (10, "C")], 20))
        }
    }

    fn files(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_process_file_outcomes() {
        let converter = fake_converter;

        match process_file(&converter, Path::new("20240101_CTRL_AB.json")) {
            FileOutcome::Processed(file) => {
                assert_eq!(file.trial, "CTRL_AB");
                assert_eq!(file.measurements.len(), 4);
                assert_eq!(file.block_labels, vec!["A", "B"]);
            }
            FileOutcome::Failed(f) => panic!("unexpected failure: {}", f.reason),
        }

        match process_file(&converter, Path::new("20240101_CTRL_bad.json")) {
            FileOutcome::Failed(file) => {
                assert_eq!(file.trial, "CTRL_bad");
                assert!(file.reason.contains("corrupt"));
            }
            FileOutcome::Processed(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn test_failures_do_not_abort_the_run() {
        let converter = fake_converter;
        let pipeline = Pipeline::new(&converter);
        let analysis = pipeline
            .analyze(&files(&["1_X_AB.json", "2_X_bad.json", "3_Y_BC.json"]), None)
            .unwrap();

        assert_eq!(analysis.succeeded_count(), 2);
        assert_eq!(analysis.failed_count(), 1);
        assert!(matches!(analysis.trials[1].status, TrialStatus::Failed(_)));
        assert_eq!(analysis.block_order.labels(), &["A", "B", "C"]);
        assert_eq!(analysis.detailed.columns(), &["A", "B", "C"]);
        assert!(analysis.regions.is_none());

        let stats = pipeline.ledger().stats();
        assert_eq!(stats.files_seen, 3);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.measurements, 8);
    }

    #[test]
    fn test_all_failures_is_fatal() {
        let converter = fake_converter;
        let err = Pipeline::new(&converter)
            .analyze(&files(&["a_bad.json", "b_bad.json"]), None)
            .unwrap_err();
        assert!(matches!(err, RunError::NoUsableData { failed: 2 }));
    }

    #[test]
    fn test_parallel_extraction_matches_sequential() {
        let converter = fake_converter;
        let names: Vec<String> = (0..12)
            .map(|i| {
                let kind = ["AB", "BC", "bad"][i % 3];
                format!("{i:02}_T{i}_{kind}.json")
            })
            .collect();
        let inputs: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();

        let sequential = Pipeline::new(&converter).analyze(&inputs, None).unwrap();
        for workers in [2, 4, 16] {
            let parallel = Pipeline::new(&converter)
                .with_workers(workers)
                .analyze(&inputs, None)
                .unwrap();
            assert_eq!(parallel.trials, sequential.trials);
            assert_eq!(parallel.block_order, sequential.block_order);
            assert_eq!(parallel.measurements, sequential.measurements);
            assert_eq!(parallel.detailed, sequential.detailed);
        }
    }

    #[test]
    fn test_reduce_builds_region_tables() {
        let converter = fake_converter;
        let map = ChannelRegionMap::from_entries(&[ChannelMapEntry::new(1, 1, "Left")]).unwrap();
        let analysis = Pipeline::new(&converter)
            .analyze(&files(&["1_X_AB.json"]), Some(&map))
            .unwrap();

        let rollup = analysis.regions.as_ref().unwrap();
        assert_eq!(analysis.region_table_count(), 1);
        assert_eq!(rollup.unmapped_measurements, 0);
        // hbo samples 0..10 average 4.5, 10..20 average 14.5
        let left = &rollup.table("Left").unwrap().table;
        assert!((left.get("X_AB", "A").unwrap() - 4.5).abs() < 1e-9);
        assert!((left.get("X_AB", "B").unwrap() - 14.5).abs() < 1e-9);
    }

    #[test]
    fn test_mapping_status_resolution() {
        assert!(matches!(MappingStatus::resolve(None), MappingStatus::NotConfigured));

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            MappingStatus::resolve(Some(&missing)),
            MappingStatus::Missing(_)
        ));

        let invalid = dir.path().join("invalid.json");
        std::fs::write(&invalid, "not json").unwrap();
        let status = MappingStatus::resolve(Some(&invalid));
        assert!(matches!(status, MappingStatus::Invalid { .. }));
        assert!(status.map().is_none());

        let valid = dir.path().join("map.json");
        std::fs::write(&valid, r#"[{"source": 1, "detector": 1, "region": "Left"}]"#).unwrap();
        let status = MappingStatus::resolve(Some(&valid));
        assert_eq!(status.map().map(ChannelRegionMap::len), Some(1));
    }

    #[test]
    fn test_discover_inputs_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.JSON", "c.txt", "d.json"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let found = discover_inputs(dir.path(), ".json").unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JSON", "b.json", "d.json"]);

        let err = discover_inputs(dir.path(), "snirf").unwrap_err();
        assert!(matches!(err, RunError::NoInputFiles { .. }));
    }
}
