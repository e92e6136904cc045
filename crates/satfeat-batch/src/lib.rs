//! # satfeat-batch: the period orchestrator
//!
//! Turns a [`RunConfig`] and a point set into one feature table per calendar
//! month, through the catalog, scene and sink implementations it is handed.
//! Every run leaves a `batch_manifest.json` in the output directory with one
//! [`PeriodRecord`] per period.

pub mod config;
pub mod manifest;
pub mod runner;

pub use config::{RunConfig, POINTS_PER_PARTITION};
pub use manifest::{
    load_batch_manifest, write_batch_manifest, BatchManifest, PeriodRecord, BATCH_MANIFEST_FILE,
};
pub use runner::{build_pool, run_periods, RunSummary};
