use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One CLI invocation, written next to its outputs as `run-<uuid>.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub run_id: String,
    pub command: String,
    pub version: String,
    pub timestamp: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub outputs: Vec<String>,
    pub params: Vec<Param>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

/// How the invocation ended.
pub struct RunStatus<'a> {
    pub duration_ms: Option<u128>,
    pub error: Option<&'a anyhow::Error>,
}

pub fn record_manifest(
    dir: &Path,
    command: &str,
    params: &[(&str, String)],
    outputs: &[String],
    status: RunStatus<'_>,
) -> Result<PathBuf> {
    let run_id = Uuid::new_v4().to_string();
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let manifest = ManifestEntry {
        run_id: run_id.clone(),
        command: command.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        status: if status.error.is_some() { "failure" } else { "success" }.to_string(),
        duration_ms: status.duration_ms,
        error: status.error.map(|err| format!("{err:#}")),
        outputs: outputs.to_vec(),
        params: params
            .iter()
            .map(|(k, v)| Param {
                name: k.to_string(),
                value: v.clone(),
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    let path = dir.join(format!("run-{}.json", run_id));
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn read_manifest(path: &Path) -> Result<ManifestEntry> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading run manifest '{}'", path.display()))?;
    let manifest = serde_json::from_str(&json)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_records_params_and_failure() {
        let dir = tempdir().unwrap();
        let err = anyhow::anyhow!("catalog down");
        let path = record_manifest(
            dir.path(),
            "run",
            &[("seed", "7".to_string())],
            &["a.parquet".to_string()],
            RunStatus {
                duration_ms: Some(12),
                error: Some(&err),
            },
        )
        .unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("run-"));

        let entry = read_manifest(&path).unwrap();
        assert_eq!(entry.command, "run");
        assert_eq!(entry.status, "failure");
        assert_eq!(entry.error.as_deref(), Some("catalog down"));
        assert_eq!(entry.params[0].name, "seed");
        assert_eq!(entry.params[0].value, "7");
        assert_eq!(entry.outputs, vec!["a.parquet"]);
    }
}
