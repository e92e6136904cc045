use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const BATCH_MANIFEST_FILE: &str = "batch_manifest.json";

/// Outcome of one period, as listed in the batch manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub year: i32,
    pub month: u32,
    pub status: String,
    pub error: Option<String>,
    pub output: Option<String>,
    pub num_points: usize,
    pub num_matched: usize,
    pub num_valid: usize,
    pub num_undersized: usize,
    pub num_constant: usize,
    pub num_failed: usize,
    pub failed_partitions: usize,
    pub duration_ms: u64,
}

impl PeriodRecord {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchManifest {
    pub created_at: DateTime<Utc>,
    pub satellite: String,
    pub region: String,
    pub num_points: usize,
    pub num_features: usize,
    pub num_periods: usize,
    pub success: usize,
    pub failure: usize,
    pub periods: Vec<PeriodRecord>,
}

pub fn write_batch_manifest(path: &Path, manifest: &BatchManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating manifest directory '{}'", parent.display()))?;
    }
    let json =
        serde_json::to_string_pretty(manifest).context("serializing batch manifest to JSON")?;
    fs::write(path, json)
        .with_context(|| format!("writing batch manifest '{}'", path.display()))?;
    Ok(())
}

pub fn load_batch_manifest(path: &Path) -> Result<BatchManifest> {
    let file = fs::File::open(path)
        .with_context(|| format!("opening batch manifest '{}'", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing batch manifest '{}'", path.display()))
}
