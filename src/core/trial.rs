//! Trial labels derived from input file names.
//!
//! Recordings are named `<date>_<treatment>_<participant>.<ext>`. The trial id
//! is `<treatment>_<participant>`; names that do not follow the convention keep
//! their whole stem. This is a best-effort label, never a validated key.

use std::path::Path;

/// Resolve the trial id for a file name or path.
pub fn trial_id(file_name: impl AsRef<Path>) -> String {
    let path = file_name.as_ref();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() >= 3 {
        format!("{}_{}", parts[1], parts[2])
    } else {
        stem
    }
}
