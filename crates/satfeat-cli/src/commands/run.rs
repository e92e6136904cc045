use anyhow::{Context, Result};
use satfeat_batch::{run_periods, RunConfig, RunSummary};
use satfeat_io::{load_points, GeoTiffScenes, ParquetSink, StacCatalog};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::manifest::{record_manifest, RunStatus};

/// Command-line values that replace what the config file says.
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub output_dir: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl RunOverrides {
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(year) = self.start_year {
            config.start_year = year;
        }
        if let Some(year) = self.end_year {
            config.end_year = year;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
    }
}

pub fn handle(config_path: &Path, overrides: &RunOverrides) -> Result<()> {
    let mut config = RunConfig::load(config_path)?;
    overrides.apply(&mut config);
    config
        .validate()
        .with_context(|| format!("validating {}", config_path.display()))?;

    let start = Instant::now();
    let result = execute(&config);
    let outputs = match &result {
        Ok(summary) => summary
            .periods
            .iter()
            .filter_map(|record| record.output.clone())
            .chain(std::iter::once(summary.manifest_path.display().to_string()))
            .collect(),
        Err(_) => Vec::new(),
    };
    let status = RunStatus {
        duration_ms: Some(start.elapsed().as_millis()),
        error: result.as_ref().err(),
    };
    match record_manifest(
        &config.output_dir,
        "run",
        &run_params(config_path, &config),
        &outputs,
        status,
    ) {
        Ok(path) => info!("recorded run manifest {}", path.display()),
        Err(err) => warn!("failed to record run manifest: {err:#}"),
    }

    let summary = result?;
    println!(
        "Processed {} period(s): {} written, {} failed; manifest {}",
        summary.periods.len(),
        summary.success,
        summary.failure,
        summary.manifest_path.display()
    );
    Ok(())
}

fn execute(config: &RunConfig) -> Result<RunSummary> {
    let store = load_points(&config.points)?;
    info!("loaded {} points from {}", store.len(), config.points.display());
    let catalog = StacCatalog::new(config.catalog_url.clone())
        .with_cloud_cover_property(config.cloud_cover_property.clone());
    let scenes = if config.download_assets {
        GeoTiffScenes::cached(config.cache_dir())
    } else {
        GeoTiffScenes::ranged()
    };
    let mut sink = ParquetSink::new(&config.output_dir);
    run_periods(config, &store, &catalog, &scenes, &mut sink)
}

fn run_params(config_path: &Path, config: &RunConfig) -> Vec<(&'static str, String)> {
    vec![
        ("config", config_path.display().to_string()),
        ("satellite", config.satellite.clone()),
        ("region", config.region.clone()),
        ("bands", config.bands.join(",")),
        ("points", config.points.display().to_string()),
        ("start", format!("{}-{:02}", config.start_year, config.start_month)),
        ("end", format!("{}-{:02}", config.end_year, config.end_month)),
        ("num_features", config.num_features.to_string()),
        ("seed", config.seed.to_string()),
        ("output_dir", config.output_dir.display().to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_given_fields() {
        let mut config: RunConfig = serde_json::from_str(
            r#"{"bands":["B04"],"region":"KEN","points":"p.csv","start_year":2019,"end_year":2020}"#,
        )
        .unwrap();
        RunOverrides {
            end_year: Some(2021),
            seed: Some(9),
            ..RunOverrides::default()
        }
        .apply(&mut config);
        assert_eq!(config.start_year, 2019);
        assert_eq!(config.end_year, 2021);
        assert_eq!(config.seed, 9);
        assert_eq!(config.output_dir, PathBuf::from("output"));
    }
}
