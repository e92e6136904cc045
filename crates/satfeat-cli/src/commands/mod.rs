pub mod inspect;
pub mod run;

use anyhow::{Context, Result};
use satfeat_batch::RunConfig;
use std::path::Path;

/// Load and validate a run config; nothing here touches the network.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let config = RunConfig::load(path)?;
    config
        .validate()
        .with_context(|| format!("validating {}", path.display()))?;
    Ok(config)
}
