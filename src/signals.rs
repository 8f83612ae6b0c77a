// src/signals.rs
//! Signal-id source file handling: one id per non-empty line (first
//! comma-delimited field), plus deterministic output naming derived from the
//! source file's stem.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Load signal ids from a delimited text file. Empty lines are skipped; only
/// the first field of each line is used. Duplicates are tolerated and simply
/// produce duplicate tasks downstream.
pub fn load_signal_ids(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading signal id list {}", path.display()))?;
    let mut ids = Vec::new();
    for line in content.lines() {
        let first = line.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            ids.push(first.to_string());
        }
    }
    Ok(ids)
}

fn sibling_with_suffix(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("signals");
    input.with_file_name(format!("{stem}{suffix}"))
}

/// Output file next to the input list: `<stem>_data.csv`.
pub fn output_path_for(input: &Path) -> PathBuf {
    sibling_with_suffix(input, "_data.csv")
}

/// Replay ledger next to the input list: `<stem>_failed.csv`.
pub fn ledger_path_for(input: &Path) -> PathBuf {
    sibling_with_suffix(input, "_failed.csv")
}
