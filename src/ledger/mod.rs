//! Run ledger for the toolkit.
//!
//! Tracks what each run processed and produced, and keeps a cumulative copy
//! on disk for the `status` command.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_ledger, ledger_path, CumulativeStats, RunLedger, RunStats, SharedRunLedger,
};
