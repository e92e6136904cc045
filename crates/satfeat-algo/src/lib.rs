//! # satfeat-algo: matching, extraction and featurization
//!
//! The four compute stages of a period run, each usable on its own:
//!
//! | Stage | Entry point | Output |
//! |-------|-------------|--------|
//! | Partition | [`partition_points`] | Hilbert-ordered point groups, one catalog query each |
//! | Match | [`SceneMatcher::match_all`] | least-cloudy covering scene per point, or none |
//! | Extract | [`PatchExtractor::extract`] | normalised multi-band patch, or why there is none |
//! | Featurize | [`RandomConvModel::featurize`] | `F` random convolutional features |
//!
//! Catalog queries and patch reads fan out over caller-supplied rayon pools;
//! the model itself is single threaded and deterministic for a given seed.
//!
//! ## Example
//!
//! ```ignore
//! use rand::{rngs::StdRng, SeedableRng};
//! use satfeat_algo::{ModelConfig, RandomConvModel};
//!
//! let config = ModelConfig { in_channels: 4, num_features: 1000, kernel_size: 3, bias: -1.0 };
//! let model = RandomConvModel::new(config, &mut StdRng::seed_from_u64(42))?;
//! let features = model.featurize(&outcome)?;
//! assert_eq!(features.len(), 1000);
//! ```

pub mod extract;
pub mod matcher;
pub mod model;
pub mod partition;

pub use extract::{normalize_min_max, ExtractConfig, PatchExtractor};
pub use matcher::{
    first_covering, sort_by_cloud_cover, MatchConfig, MatchError, MatchStats, PartitionMatch,
    PeriodAssignments, SceneHandle, SceneMatcher,
};
pub use model::{ModelConfig, ModelError, RandomConvModel};
pub use partition::{
    hilbert_index, hilbert_keys, partition_count_for, partition_points, Partition, PartitionError,
    HILBERT_ORDER,
};
