//! Persistence layer.
//!
//! The master record and the report data are plain pretty-printed JSON
//! files. Writes go to a sibling temp file first and are renamed into
//! place, so an interrupted run leaves the previous file intact.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::engine::projector::ReportData;
use crate::types::MasterRecord;

/// Default master record file.
pub const DEFAULT_MASTER_FILE: &str = "combined_quotes.json";
/// Default report data file.
pub const DEFAULT_REPORT_FILE: &str = "report_data.json";

/// Save the master record.
pub fn save_master(master: &MasterRecord, path: &Path) -> Result<()> {
    write_json(master, path).context("Failed to save master record")?;
    debug!(
        path = %path.display(),
        insurers = master.quotes.len(),
        "Master record saved"
    );
    Ok(())
}

/// Load the master record.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_master(path: &Path) -> Result<Option<MasterRecord>> {
    if !path.exists() {
        info!(path = %path.display(), "No master record found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read master record from {}", path.display()))?;

    let master: MasterRecord = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse master record from {}", path.display()))?;

    info!(
        path = %path.display(),
        insurers = master.quotes.len(),
        general_info = master.general_info.len(),
        "Master record loaded from disk"
    );

    Ok(Some(master))
}

/// Save the report data consumed by the document renderer.
pub fn save_report(report: &ReportData, path: &Path) -> Result<()> {
    write_json(report, path).context("Failed to save report data")?;
    debug!(path = %path.display(), keys = report.fields.len(), "Report data saved");
    Ok(())
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise JSON")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, &json)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
