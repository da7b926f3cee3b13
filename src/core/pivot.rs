//! Wide summary tables built from channel measurements.
//!
//! Two families are produced from the oxygenated-hemoglobin measurements:
//!
//! - the detailed table, one row per `"<trial> | <channel>"`;
//! - one region table per anatomical region, one row per trial, holding the
//!   mean over the region's channels.
//!
//! Columns are block labels ordered by [`GlobalBlockOrder`], restricted to the
//! labels present in the table. Missing combinations are `None`, never zero.

use crate::core::order::GlobalBlockOrder;
use crate::core::region::{source_detector_key, ChannelRegionMap};
use crate::core::stats::{ChannelMeasurement, HbType};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Header of the row-label column in the detailed table.
pub const DETAILED_ROW_HEADER: &str = "Row_Label";

/// Header of the row-label column in region tables.
pub const REGION_ROW_HEADER: &str = "Trial";

/// A 2-D table of optional float cells with ordered row and column keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    row_header: String,
    rows: Vec<String>,
    columns: Vec<String>,
    cells: Vec<Vec<Option<f64>>>,
}

impl PivotTable {
    /// Assemble a table; every row of `cells` must have one entry per column.
    pub fn new(
        row_header: impl Into<String>,
        rows: Vec<String>,
        columns: Vec<String>,
        cells: Vec<Vec<Option<f64>>>,
    ) -> Option<Self> {
        if cells.len() != rows.len() || cells.iter().any(|r| r.len() != columns.len()) {
            return None;
        }
        Some(Self {
            row_header: row_header.into(),
            rows,
            columns,
            cells,
        })
    }

    pub fn row_header(&self) -> &str {
        &self.row_header
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of one row, in column order.
    pub fn row_values(&self, index: usize) -> Option<&[Option<f64>]> {
        self.cells.get(index).map(Vec::as_slice)
    }

    /// Cell value by row and column key.
    pub fn get(&self, row: &str, column: &str) -> Option<f64> {
        let r = self.rows.iter().position(|k| k == row)?;
        let c = self.columns.iter().position(|k| k == column)?;
        self.cells[r][c]
    }
}

/// Running mean of a cell; values that are "no value" do not contribute.
#[derive(Debug, Clone, Copy, Default)]
struct CellAccumulator {
    sum: f64,
    count: usize,
}

impl CellAccumulator {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Row key → column key → accumulated cell.
type CellGrid = BTreeMap<String, BTreeMap<String, CellAccumulator>>;

/// (trial, block) → channel key → accumulated channel mean.
type ChannelCells = BTreeMap<(String, String), BTreeMap<String, CellAccumulator>>;

fn grid_to_table(row_header: &str, grid: CellGrid, order: &GlobalBlockOrder) -> PivotTable {
    let present: BTreeSet<&str> = grid
        .values()
        .flat_map(|cols| cols.keys().map(String::as_str))
        .collect();
    let columns = order.arrange(present);

    let rows: Vec<String> = grid.keys().cloned().collect();
    let cells = grid
        .values()
        .map(|cols| {
            columns
                .iter()
                .map(|c| cols.get(c).and_then(CellAccumulator::mean))
                .collect()
        })
        .collect();

    PivotTable {
        row_header: row_header.to_string(),
        rows,
        columns,
        cells,
    }
}

fn oxygenated(measurements: &[ChannelMeasurement]) -> impl Iterator<Item = &ChannelMeasurement> {
    measurements.iter().filter(|m| m.hb_type == HbType::HbO)
}

/// Detailed table: `"<trial> | <channel>"` rows × block columns over HbO channels.
///
/// Duplicate (row, block) combinations are averaged.
pub fn build_detailed_table(
    measurements: &[ChannelMeasurement],
    order: &GlobalBlockOrder,
) -> PivotTable {
    let mut grid = CellGrid::new();
    for m in oxygenated(measurements) {
        grid.entry(format!("{} | {}", m.trial, m.channel))
            .or_default()
            .entry(m.block.clone())
            .or_default()
            .add(m.mean);
    }
    grid_to_table(DETAILED_ROW_HEADER, grid, order)
}

/// Region-level table and the number of distinct channels averaged into it.
#[derive(Debug, Clone, Serialize)]
pub struct RegionTable {
    pub region: String,
    pub table: PivotTable,
    pub channel_count: usize,
}

/// Result of rolling HbO measurements up to regions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegionRollup {
    /// One table per region, lexicographic by region name
    pub tables: Vec<RegionTable>,
    /// HbO measurements whose channel has no region
    pub unmapped_measurements: usize,
    /// Distinct labels of those channels
    pub unmapped_channels: BTreeSet<String>,
}

impl RegionRollup {
    pub fn table(&self, region: &str) -> Option<&RegionTable> {
        self.tables.iter().find(|t| t.region == region)
    }
}

/// Region tables: trial rows × block columns, one table per mapped region.
///
/// Each cell is a two-stage mean: a channel's measurements for the same
/// (trial, block) are averaged first, then those channel means are averaged
/// across the region. Unmapped channels are counted and left out.
pub fn build_region_tables(
    measurements: &[ChannelMeasurement],
    map: &ChannelRegionMap,
    order: &GlobalBlockOrder,
) -> RegionRollup {
    // region → (trial, block) → channel key → channel mean
    let mut per_channel: BTreeMap<&str, ChannelCells> = BTreeMap::new();
    let mut channels_per_region: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    let mut rollup = RegionRollup::default();

    for m in oxygenated(measurements) {
        let mapped = source_detector_key(&m.channel)
            .and_then(|key| map.region_for_key(&key).map(|region| (key, region)));
        let Some((key, region)) = mapped else {
            rollup.unmapped_measurements += 1;
            rollup.unmapped_channels.insert(m.channel.clone());
            continue;
        };

        channels_per_region
            .entry(region)
            .or_default()
            .insert(key.clone());
        per_channel
            .entry(region)
            .or_default()
            .entry((m.trial.clone(), m.block.clone()))
            .or_default()
            .entry(key)
            .or_default()
            .add(m.mean);
    }

    for (region, cells) in per_channel {
        let mut grid = CellGrid::new();
        for ((trial, block), channels) in cells {
            let cell = grid.entry(trial).or_default().entry(block).or_default();
            for channel in channels.values() {
                cell.add(channel.mean());
            }
        }

        rollup.tables.push(RegionTable {
            region: region.to_string(),
            table: grid_to_table(REGION_ROW_HEADER, grid, order),
            channel_count: channels_per_region.get(region).map_or(0, BTreeSet::len),
        });
    }

    rollup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::region::ChannelMapEntry;

    fn hbo(trial: &str, block: &str, channel: &str, mean: Option<f64>) -> ChannelMeasurement {
        ChannelMeasurement {
            trial: trial.into(),
            block: block.into(),
            channel: channel.into(),
            hb_type: HbType::classify(channel),
            mean,
            std: mean.map(|_| 0.0),
            duration_secs: 10.0,
        }
    }

    fn order(labels: &[&str]) -> GlobalBlockOrder {
        let mut order = GlobalBlockOrder::new();
        order.observe_file(labels);
        order
    }

    #[test]
    fn test_detailed_rows_columns_and_hbo_filter() {
        let rows = vec![
            hbo("T1", "B", "S1_D1 hbo", Some(2.0)),
            hbo("T1", "A", "S1_D1 hbo", Some(1.0)),
            hbo("T1", "A", "S1_D1 hbr", Some(-1.0)),
            hbo("T2", "C", "S1_D1 hbo", Some(3.0)),
        ];
        let table = build_detailed_table(&rows, &order(&["A", "B", "C", "D"]));

        assert_eq!(table.row_header(), DETAILED_ROW_HEADER);
        assert_eq!(table.columns(), &["A", "B", "C"]);
        assert_eq!(table.rows(), &["T1 | S1_D1 hbo", "T2 | S1_D1 hbo"]);
        assert_eq!(table.get("T1 | S1_D1 hbo", "A"), Some(1.0));
        assert_eq!(table.get("T1 | S1_D1 hbo", "C"), None);
        assert_eq!(table.get("T2 | S1_D1 hbo", "C"), Some(3.0));
        assert_eq!(table.shape(), (2, 3));
    }

    #[test]
    fn test_detailed_duplicates_are_averaged() {
        let rows = vec![
            hbo("T1", "Task", "S1_D1 hbo", Some(1.0)),
            hbo("T1", "Task", "S1_D1 hbo", Some(3.0)),
            hbo("T1", "Task", "S1_D1 hbo", None),
        ];
        let table = build_detailed_table(&rows, &order(&["Task"]));
        assert_eq!(table.get("T1 | S1_D1 hbo", "Task"), Some(2.0));
    }

    #[test]
    fn test_all_empty_cell_stays_empty() {
        let rows = vec![
            hbo("T1", "A", "S1_D1 hbo", Some(1.0)),
            hbo("T1", "Z", "S1_D1 hbo", None),
        ];
        let table = build_detailed_table(&rows, &order(&["A", "Z"]));

        assert_eq!(table.columns(), &["A", "Z"]);
        assert_eq!(table.row_values(0), Some(&[Some(1.0), None][..]));
    }

    #[test]
    fn test_region_rollup_is_mean_of_channel_means() {
        let map = ChannelRegionMap::from_entries(&[
            ChannelMapEntry::new(1, 1, "Left"),
            ChannelMapEntry::new(1, 2, "Left"),
            ChannelMapEntry::new(2, 1, "Right"),
        ])
        .unwrap();

        let rows = vec![
            // S1_D1 appears twice in block A: its channel mean is 2.0
            hbo("T1", "A", "S1_D1 hbo", Some(1.0)),
            hbo("T1", "A", "S1_D1 hbo", Some(3.0)),
            hbo("T1", "A", "S1_D2 hbo", Some(6.0)),
            hbo("T1", "A", "S2_D1 hbo", Some(-1.0)),
            hbo("T1", "A", "S1_D1 hbr", Some(100.0)),
            hbo("T1", "A", "S7_D7 hbo", Some(50.0)),
            hbo("T1", "A", "Fp1 hbo", Some(50.0)),
        ];
        let rollup = build_region_tables(&rows, &map, &order(&["A"]));

        let regions: Vec<&str> = rollup.tables.iter().map(|t| t.region.as_str()).collect();
        assert_eq!(regions, vec!["Left", "Right"]);

        let left = rollup.table("Left").unwrap();
        assert_eq!(left.channel_count, 2);
        assert_eq!(left.table.row_header(), REGION_ROW_HEADER);
        assert_eq!(left.table.get("T1", "A"), Some(4.0));

        let right = rollup.table("Right").unwrap();
        assert_eq!(right.channel_count, 1);
        assert_eq!(right.table.get("T1", "A"), Some(-1.0));

        assert_eq!(rollup.unmapped_measurements, 2);
        assert_eq!(
            rollup.unmapped_channels.iter().collect::<Vec<_>>(),
            vec!["Fp1 hbo", "S7_D7 hbo"]
        );
    }

    #[test]
    fn test_remapping_changes_only_affected_region() {
        let rows = vec![
            hbo("T1", "A", "S1_D1 hbo", Some(1.0)),
            hbo("T1", "A", "S1_D2 hbo", Some(5.0)),
            hbo("T1", "A", "S2_D1 hbo", Some(9.0)),
        ];
        let order = order(&["A"]);

        let before = ChannelRegionMap::from_entries(&[
            ChannelMapEntry::new(1, 1, "Left"),
            ChannelMapEntry::new(1, 2, "Left"),
            ChannelMapEntry::new(2, 1, "Right"),
        ])
        .unwrap();
        let after = ChannelRegionMap::from_entries(&[
            ChannelMapEntry::new(1, 1, "Left"),
            ChannelMapEntry::new(1, 2, "Middle"),
            ChannelMapEntry::new(2, 1, "Right"),
        ])
        .unwrap();

        let before = build_region_tables(&rows, &before, &order);
        let after = build_region_tables(&rows, &after, &order);

        assert_eq!(before.table("Left").unwrap().table.get("T1", "A"), Some(3.0));
        assert_eq!(after.table("Left").unwrap().table.get("T1", "A"), Some(1.0));
        assert_eq!(after.table("Middle").unwrap().table.get("T1", "A"), Some(5.0));
        assert_eq!(
            before.table("Right").unwrap().table,
            after.table("Right").unwrap().table
        );
    }

    #[test]
    fn test_table_new_checks_shape() {
        assert!(PivotTable::new("r", vec!["a".into()], vec!["x".into()], vec![vec![None]]).is_some());
        assert!(PivotTable::new("r", vec!["a".into()], vec!["x".into()], vec![vec![]]).is_none());
    }
}
