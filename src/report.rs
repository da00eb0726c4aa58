use anyhow::{Context, Result};
use log2::info;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::crawler::PageResult;

/// Where reports land unless told otherwise
pub const RESULT_DIR: &str = "./results";

/// Writes `snapshot` as JSON to `<dir>/<prefix>_<unix seconds>.json`,
/// creating `dir` if needed. Returns the path written.
pub fn write_report(
    dir: &Path,
    prefix: &str,
    snapshot: &BTreeMap<String, PageResult>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create result directory {}", dir.display()))?;

    let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let path = dir.join(format!("{}_{}.json", prefix, stamp));

    let file = File::create(&path)
        .with_context(|| format!("Failed to create report {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, snapshot)?;
    writer.flush()?;

    let summary = Summary::of(snapshot);
    info!(
        "Report written to {}: {} pages, {} valid, {} invalid",
        path.display(),
        summary.total,
        summary.valid,
        summary.invalid
    );

    Ok(path)
}

/// Page counts of a snapshot
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
}

impl Summary {
    pub fn of(snapshot: &BTreeMap<String, PageResult>) -> Self {
        let valid = snapshot.values().filter(|page| page.valid).count();
        Self {
            total: snapshot.len(),
            valid,
            invalid: snapshot.len() - valid,
        }
    }
}
