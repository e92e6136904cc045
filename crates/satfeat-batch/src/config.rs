use anyhow::{Context, Result};
use satfeat_algo::{partition_count_for, ExtractConfig, MatchConfig, ModelConfig};
use satfeat_core::{ErrorPolicy, OutputName, Period, SatfeatError, SatfeatResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Points per catalog query when `num_partitions` is left at 0.
pub const POINTS_PER_PARTITION: usize = 500;

/// Everything a run needs, loaded from TOML, YAML or JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_satellite")]
    pub satellite: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
    #[serde(default = "default_cloud_cover_property")]
    pub cloud_cover_property: String,
    #[serde(default)]
    pub bands: Vec<String>,
    #[serde(default = "default_num_features")]
    pub num_features: usize,
    #[serde(default = "default_kernel_size")]
    pub kernel_size: usize,
    #[serde(default = "default_bias")]
    pub bias: f64,
    pub region: String,
    pub points: PathBuf,
    pub start_year: i32,
    pub end_year: i32,
    #[serde(default = "default_start_month")]
    pub start_month: u32,
    #[serde(default = "default_end_month")]
    pub end_month: u32,
    #[serde(default = "default_cloud_cover_max")]
    pub cloud_cover_max: f64,
    #[serde(default = "default_buffer_deg")]
    pub buffer_deg: f64,
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default = "default_min_patch_edge")]
    pub min_patch_edge: usize,
    #[serde(default)]
    pub nodata: Option<f32>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub num_partitions: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default)]
    pub catalog_workers: usize,
    #[serde(default)]
    pub extract_workers: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Download whole remote assets into `cache_dir` instead of range reads.
    #[serde(default)]
    pub download_assets: bool,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub on_catalog_error: ErrorPolicy,
    #[serde(default)]
    pub on_period_error: ErrorPolicy,
}

fn default_satellite() -> String {
    "s2".to_string()
}

fn default_collection() -> String {
    "sentinel-2-l2a".to_string()
}

fn default_catalog_url() -> String {
    "https://earth-search.aws.element84.com/v1".to_string()
}

fn default_cloud_cover_property() -> String {
    "eo:cloud_cover".to_string()
}

fn default_num_features() -> usize {
    1000
}

fn default_kernel_size() -> usize {
    3
}

fn default_bias() -> f64 {
    -1.0
}

fn default_start_month() -> u32 {
    1
}

fn default_end_month() -> u32 {
    12
}

fn default_cloud_cover_max() -> f64 {
    10.0
}

fn default_buffer_deg() -> f64 {
    0.005
}

fn default_resolution() -> f64 {
    10.0
}

fn default_min_patch_edge() -> usize {
    10
}

fn default_batch_size() -> usize {
    256
}

fn default_search_limit() -> usize {
    500
}

fn default_queue_depth() -> usize {
    2
}

fn default_seed() -> u64 {
    42
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl RunConfig {
    /// Parse by extension; anything other than `.toml`/`.json` is read as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading run config '{}'", path.display()))?;
        let mut config: RunConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => {
                toml::from_str(&data).context("parsing run config toml")?
            }
            Some(ext) if ext.eq_ignore_ascii_case("json") => {
                serde_json::from_str(&data).context("parsing run config json")?
            }
            _ => serde_yaml::from_str(&data).context("parsing run config yaml")?,
        };
        // Relative point paths are resolved against the config file.
        if config.points.is_relative() {
            if let Some(parent) = path.parent() {
                config.points = parent.join(&config.points);
            }
        }
        Ok(config)
    }

    /// Reject anything that would fail mid-run. Called before any catalog
    /// request is issued.
    pub fn validate(&self) -> SatfeatResult<()> {
        let fail = |msg: String| -> SatfeatResult<()> { Err(SatfeatError::Config(msg)) };
        self.model_config(self.bands.len().max(1)).validate()?;
        if self.bands.is_empty() {
            return fail("at least one band is required".into());
        }
        if self.min_patch_edge < self.kernel_size {
            return fail(format!(
                "min_patch_edge {} is smaller than kernel_size {}",
                self.min_patch_edge, self.kernel_size
            ));
        }
        if self.batch_size == 0 {
            return fail("batch_size must be at least 1".into());
        }
        if self.queue_depth == 0 {
            return fail("queue_depth must be at least 1".into());
        }
        if self.search_limit == 0 {
            return fail("search_limit must be at least 1".into());
        }
        if !(self.buffer_deg > 0.0) {
            return fail(format!("buffer_deg must be positive, got {}", self.buffer_deg));
        }
        if !(self.resolution > 0.0) {
            return fail(format!("resolution must be positive, got {}", self.resolution));
        }
        if !(self.cloud_cover_max > 0.0 && self.cloud_cover_max <= 100.0) {
            return fail(format!(
                "cloud_cover_max must be in (0, 100], got {}",
                self.cloud_cover_max
            ));
        }
        if self.satellite.trim().is_empty() || self.region.trim().is_empty() {
            return fail("satellite and region must be non-empty".into());
        }
        self.periods()?;
        Ok(())
    }

    /// Inclusive, chronological month range.
    pub fn periods(&self) -> SatfeatResult<Vec<Period>> {
        let start = Period::new(self.start_year, self.start_month)?;
        let end = Period::new(self.end_year, self.end_month)?;
        Period::range(start, end)
    }

    pub fn partition_count(&self, num_points: usize) -> usize {
        if self.num_partitions == 0 {
            partition_count_for(num_points, POINTS_PER_PARTITION)
        } else {
            self.num_partitions
        }
    }

    pub fn model_config(&self, in_channels: usize) -> ModelConfig {
        ModelConfig {
            in_channels,
            num_features: self.num_features,
            kernel_size: self.kernel_size,
            bias: self.bias,
        }
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            collection_id: self.collection.clone(),
            cloud_cover_max: self.cloud_cover_max,
            limit: self.search_limit,
        }
    }

    pub fn extract_config(&self) -> ExtractConfig {
        ExtractConfig {
            bands: self.bands.clone(),
            buffer_deg: self.buffer_deg,
            resolution: self.resolution,
            min_patch_edge: self.min_patch_edge,
            nodata: self.nodata,
        }
    }

    pub fn output_name(&self, num_points: usize, period: Period) -> OutputName {
        OutputName::new(
            &self.satellite,
            &self.bands,
            &self.region,
            num_points,
            self.num_features,
            period,
        )
    }

    /// Download cache for remote rasters; `<output_dir>/.cache` by default.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join(".cache"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MINIMAL_TOML: &str = r#"
bands = ["B02", "B03", "B04", "B08"]
region = "KEN"
points = "points.csv"
start_year = 2019
end_year = 2020
"#;

    #[test]
    fn defaults_fill_unset_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, MINIMAL_TOML).unwrap();
        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.num_features, 1000);
        assert_eq!(config.kernel_size, 3);
        assert_eq!(config.bias, -1.0);
        assert_eq!(config.cloud_cover_max, 10.0);
        assert_eq!(config.buffer_deg, 0.005);
        assert_eq!(config.batch_size, 256);
        assert_eq!(config.seed, 42);
        assert_eq!(config.queue_depth, 2);
        assert_eq!(config.on_catalog_error, ErrorPolicy::Skip);
        assert_eq!(config.points, dir.path().join("points.csv"));
        assert_eq!(config.cache_dir(), PathBuf::from("output").join(".cache"));
        assert!(!config.download_assets);
        config.validate().unwrap();
        assert_eq!(config.periods().unwrap().len(), 24);
    }

    #[test]
    fn yaml_and_json_load_the_same_fields() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("run.yaml");
        fs::write(
            &yaml,
            "bands: [B04]\nregion: TZA\npoints: /data/p.parquet\nstart_year: 2021\nend_year: 2021\nstart_month: 3\nend_month: 5\non_period_error: abort\n",
        )
        .unwrap();
        let config = RunConfig::load(&yaml).unwrap();
        assert_eq!(config.on_period_error, ErrorPolicy::Abort);
        assert_eq!(config.points, PathBuf::from("/data/p.parquet"));
        assert_eq!(config.periods().unwrap().len(), 3);

        let json = dir.path().join("run.json");
        fs::write(
            &json,
            r#"{"bands":["B04"],"region":"TZA","points":"/p.csv","start_year":2021,"end_year":2021,"num_features":64}"#,
        )
        .unwrap();
        assert_eq!(RunConfig::load(&json).unwrap().num_features, 64);
    }

    fn base() -> RunConfig {
        toml::from_str(MINIMAL_TOML).unwrap()
    }

    #[test]
    fn invalid_settings_are_config_errors() {
        let cases: Vec<Box<dyn Fn(&mut RunConfig)>> = vec![
            Box::new(|c| c.num_features = 999),
            Box::new(|c| c.num_features = 0),
            Box::new(|c| c.bands.clear()),
            Box::new(|c| c.batch_size = 0),
            Box::new(|c| c.buffer_deg = 0.0),
            Box::new(|c| c.resolution = -10.0),
            Box::new(|c| c.cloud_cover_max = 0.0),
            Box::new(|c| c.cloud_cover_max = 101.0),
            Box::new(|c| c.min_patch_edge = 2),
            Box::new(|c| c.end_year = 2018),
            Box::new(|c| c.start_month = 13),
        ];
        for (i, mutate) in cases.iter().enumerate() {
            let mut config = base();
            mutate(&mut config);
            let err = config.validate().unwrap_err();
            assert!(err.is_config(), "case {i}: {err}");
        }
    }

    #[test]
    fn partition_count_defaults_to_points_per_query() {
        let mut config = base();
        assert_eq!(config.partition_count(1200), 3);
        assert_eq!(config.partition_count(10), 1);
        config.num_partitions = 8;
        assert_eq!(config.partition_count(10), 8);
    }

    #[test]
    fn output_names_follow_config() {
        let config = base();
        let period = Period::new(2019, 7).unwrap();
        assert_eq!(
            config.output_name(25_000, period).file_name("parquet"),
            "s2_2-3-4-8_KEN_25k-points_1000-features_2019_07.parquet"
        );
    }
}
