//! Delimited-table persistence for pivot tables and measurements.
//!
//! Tables are written as CSV: a header row with the row-label header followed
//! by the ordered block labels, then one line per row. "No value" cells are
//! written as empty fields and read back as `None`, never as `0`.

use crate::core::pivot::PivotTable;
use crate::core::stats::ChannelMeasurement;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the detailed pivot table.
pub const DETAILED_TABLE_FILE: &str = "hbo_averages_detailed_pivot.csv";

/// File name of the long-format measurement table.
pub const MEASUREMENTS_FILE: &str = "hemoglobin_measurements.csv";

/// Errors writing or reading tables.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("I/O error in {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} row {row}: '{value}' is not a number")]
    InvalidCell {
        path: String,
        row: usize,
        value: String,
    },
    #[error("{path}: missing header row")]
    MissingHeader { path: String },
    #[error("{path} row {row}: expected {expected} fields, found {found}")]
    RowLength {
        path: String,
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// File-system safe form of a region name: lowercase, spaces and `/` as `_`.
pub fn safe_region_name(region: &str) -> String {
    region.replace([' ', '/'], "_").to_lowercase()
}

fn table_file_name(stem: &str) -> String {
    format!("hbo_region_{stem}.csv")
}

/// Assigns each region a distinct file-name stem for one run.
///
/// Region names that differ only in case, spaces or `/` share a safe name;
/// the first region to ask keeps it and later ones get `_2`, `_3`, ...
/// Asking again for the same region returns the same stem.
#[derive(Debug, Default)]
pub struct RegionStems {
    assigned: HashMap<String, String>,
    taken: HashSet<String>,
}

impl RegionStems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stem(&mut self, region: &str) -> String {
        if let Some(stem) = self.assigned.get(region) {
            return stem.clone();
        }

        let base = safe_region_name(region);
        let mut stem = base.clone();
        let mut n = 1;
        while self.taken.contains(&stem) {
            n += 1;
            stem = format!("{base}_{n}");
        }
        if n > 1 {
            tracing::warn!(
                "Region '{}' shares file name '{}' with another region; using '{}'",
                region,
                base,
                stem
            );
        }

        self.taken.insert(stem.clone());
        self.assigned.insert(region.to_string(), stem.clone());
        stem
    }

    /// Table file name (`hbo_region_<stem>.csv`) for a region, unique within this run.
    pub fn table_file(&mut self, region: &str) -> String {
        table_file_name(&self.stem(region))
    }
}

fn format_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write a table to any writer.
pub fn write_table_to<W: Write>(
    writer: W,
    table: &PivotTable,
    origin: &str,
) -> Result<(), ReportError> {
    let csv_err = |source| ReportError::Csv {
        path: origin.to_string(),
        source,
    };
    let mut out = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(table.columns().len() + 1);
    header.push(table.row_header());
    header.extend(table.columns().iter().map(String::as_str));
    out.write_record(&header).map_err(csv_err)?;

    for (index, row) in table.rows().iter().enumerate() {
        let mut record = Vec::with_capacity(table.columns().len() + 1);
        record.push(row.clone());
        if let Some(values) = table.row_values(index) {
            record.extend(values.iter().map(|v| format_cell(*v)));
        }
        out.write_record(&record).map_err(csv_err)?;
    }

    out.flush().map_err(|source| ReportError::Io {
        path: origin.to_string(),
        source,
    })
}

/// Write a table to a CSV file.
///
/// The table is written next to its destination and renamed into place, so a
/// failed write never leaves a truncated table behind.
pub fn write_table(path: &Path, table: &PivotTable) -> Result<(), ReportError> {
    let origin = path.display().to_string();
    let io_err = |source| ReportError::Io {
        path: origin.clone(),
        source,
    };

    let mut staging = path.as_os_str().to_owned();
    staging.push(".partial");
    let staging = PathBuf::from(staging);

    let file = std::fs::File::create(&staging).map_err(io_err)?;
    if let Err(e) = write_table_to(file, table, &origin) {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }
    std::fs::rename(&staging, path).map_err(|e| {
        let _ = std::fs::remove_file(&staging);
        io_err(e)
    })
}

/// Read a table back from any reader.
pub fn read_table_from<R: Read>(reader: R, origin: &str) -> Result<PivotTable, ReportError> {
    let csv_err = |source| ReportError::Csv {
        path: origin.to_string(),
        source,
    };
    let mut input = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = input.records();

    let header = records
        .next()
        .ok_or_else(|| ReportError::MissingHeader {
            path: origin.to_string(),
        })?
        .map_err(csv_err)?;
    let row_header = header.get(0).unwrap_or("").to_string();
    let columns: Vec<String> = header.iter().skip(1).map(str::to_string).collect();

    let mut rows = Vec::new();
    let mut cells = Vec::new();
    for (row_no, result) in records.enumerate() {
        let record = result.map_err(csv_err)?;
        if record.len() != columns.len() + 1 {
            return Err(ReportError::RowLength {
                path: origin.to_string(),
                row: row_no,
                expected: columns.len() + 1,
                found: record.len(),
            });
        }

        rows.push(record.get(0).unwrap_or("").to_string());
        let values = record
            .iter()
            .skip(1)
            .map(|field| {
                if field.trim().is_empty() {
                    return Ok(None);
                }
                field
                    .trim()
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| ReportError::InvalidCell {
                        path: origin.to_string(),
                        row: row_no,
                        value: field.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        cells.push(values);
    }

    PivotTable::new(row_header, rows, columns, cells).ok_or_else(|| ReportError::MissingHeader {
        path: origin.to_string(),
    })
}

/// Read a table from a CSV file.
pub fn read_table(path: &Path) -> Result<PivotTable, ReportError> {
    let origin = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|source| ReportError::Io {
        path: origin.clone(),
        source,
    })?;
    read_table_from(file, &origin)
}

/// Write the combined long-format measurement table.
pub fn write_measurements(
    path: &Path,
    measurements: &[ChannelMeasurement],
) -> Result<(), ReportError> {
    let origin = path.display().to_string();
    let csv_err = |source| ReportError::Csv {
        path: origin.clone(),
        source,
    };
    let mut out = csv::Writer::from_path(path).map_err(csv_err)?;
    for measurement in measurements {
        out.serialize(measurement).map_err(csv_err)?;
    }
    out.flush().map_err(|source| ReportError::Io {
        path: origin.clone(),
        source,
    })
}

/// Paths of every table written for one run.
#[derive(Debug, Clone, Default)]
pub struct WrittenTables {
    pub measurements: Option<PathBuf>,
    pub detailed: Option<PathBuf>,
    pub regions: Vec<(String, PathBuf)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stats::HbType;

    fn sample_table() -> PivotTable {
        PivotTable::new(
            "Trial",
            vec!["CTRL_P01".into(), "CTRL_P02".into()],
            vec!["Rest".into(), "Task".into(), "Recovery".into()],
            vec![
                vec![Some(1.5e-7), None, Some(-0.25)],
                vec![None, Some(0.0), Some(3.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_safe_region_name() {
        assert_eq!(safe_region_name("Left DLPFC"), "left_dlpfc");
        assert_eq!(safe_region_name("Frontal/Pole"), "frontal_pole");
    }

    #[test]
    fn test_region_stems_are_unique() {
        let mut stems = RegionStems::new();
        assert_eq!(stems.table_file("Left PFC"), "hbo_region_left_pfc.csv");
        assert_eq!(stems.table_file("left_pfc"), "hbo_region_left_pfc_2.csv");
        assert_eq!(stems.stem("LEFT/PFC"), "left_pfc_3");
        // Repeated lookups are stable
        assert_eq!(stems.stem("Left PFC"), "left_pfc");
        assert_eq!(stems.stem("left_pfc"), "left_pfc_2");
    }

    #[test]
    fn test_region_stems_skip_names_already_taken() {
        let mut stems = RegionStems::new();
        assert_eq!(stems.stem("a_2"), "a_2");
        assert_eq!(stems.stem("A"), "a");
        assert_eq!(stems.stem("a"), "a_3");
    }

    #[test]
    fn test_failed_rename_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("occupied.csv");
        std::fs::create_dir(&path).unwrap();

        let err = write_table(&path, &sample_table()).unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));
        assert!(!dir.path().join("occupied.csv.partial").exists());
    }

    #[test]
    fn test_empty_cells_are_written_empty() {
        let mut buf = Vec::new();
        write_table_to(&mut buf, &sample_table(), "mem").unwrap();
        let text = String::from_utf8(buf).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Trial,Rest,Task,Recovery");
        assert_eq!(lines[1], "CTRL_P01,0.00000015,,-0.25");
        assert_eq!(lines[2], "CTRL_P02,,0,3");
    }

    #[test]
    fn test_round_trip_preserves_order_and_empty_cells() {
        let table = sample_table();
        let mut buf = Vec::new();
        write_table_to(&mut buf, &table, "mem").unwrap();

        let back = read_table_from(buf.as_slice(), "mem").unwrap();
        assert_eq!(back, table);
        assert_eq!(back.get("CTRL_P01", "Task"), None);
        assert_eq!(back.get("CTRL_P02", "Task"), Some(0.0));
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RegionStems::new().table_file("Left DLPFC"));

        write_table(&path, &sample_table()).unwrap();
        assert_eq!(read_table(&path).unwrap(), sample_table());
    }

    #[test]
    fn test_write_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DETAILED_TABLE_FILE);

        write_table(&path, &sample_table()).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(DETAILED_TABLE_FILE)]);
    }

    #[test]
    fn test_read_rejects_bad_cells() {
        let err = read_table_from("Trial,A\nT1,abc\n".as_bytes(), "mem").unwrap_err();
        assert!(matches!(err, ReportError::InvalidCell { row: 0, .. }));

        let err = read_table_from("Trial,A,B\nT1,1\n".as_bytes(), "mem").unwrap_err();
        assert!(matches!(err, ReportError::RowLength { found: 2, .. }));

        let err = read_table_from("".as_bytes(), "mem").unwrap_err();
        assert!(matches!(err, ReportError::MissingHeader { .. }));
    }

    #[test]
    fn test_measurements_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MEASUREMENTS_FILE);
        let rows = vec![ChannelMeasurement {
            trial: "CTRL_P01".into(),
            block: "Z".into(),
            channel: "S1_D1 hbo".into(),
            hb_type: HbType::HbO,
            mean: None,
            std: None,
            duration_secs: 0.0,
        }];

        write_measurements(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "Trial,Block,Channel,HbType,Mean_Value,Std_Value,Block_Duration_s"
        );
        assert_eq!(lines[1], "CTRL_P01,Z,S1_D1 hbo,HbO,,,0.0");
    }
}
