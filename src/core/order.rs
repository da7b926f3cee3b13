//! First-seen ordering of block labels across every processed file.
//!
//! Files are merged in a fixed order; each file appends the labels it
//! introduces, in the order its blocks occur. A label's position never changes
//! once it has been inserted.

use crate::core::segment::Block;
use serde::Serialize;
use std::collections::HashSet;

/// Ordered, deduplicated set of block labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GlobalBlockOrder {
    labels: Vec<String>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl GlobalBlockOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the block labels of one file, in that file's block order.
    ///
    /// Returns the number of labels that were new.
    pub fn observe_file<I, S>(&mut self, labels: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for label in labels {
            let label = label.as_ref();
            if self.seen.insert(label.to_string()) {
                self.labels.push(label.to_string());
                added += 1;
            }
        }
        added
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.seen.contains(label)
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Order a set of column labels by first appearance.
    ///
    /// Only labels in `present` are returned. Labels this order has never seen
    /// go last, sorted lexicographically.
    pub fn arrange<'a, I>(&self, present: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: HashSet<&str> = present.into_iter().collect();

        let mut columns: Vec<String> = self
            .labels
            .iter()
            .filter(|label| present.contains(label.as_str()))
            .cloned()
            .collect();

        let mut unknown: Vec<&str> = present
            .into_iter()
            .filter(|label| !self.seen.contains(*label))
            .collect();
        unknown.sort_unstable();
        columns.extend(unknown.into_iter().map(str::to_string));

        columns
    }
}

/// Distinct block labels of one file, in first-occurrence order.
pub fn distinct_block_labels(blocks: &[Block]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut labels = Vec::new();
    for block in blocks {
        if seen.insert(block.label.as_str()) {
            labels.push(block.label.clone());
        }
    }
    labels
}
