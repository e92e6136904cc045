//! Point to scene matching for one period.
//!
//! Each partition issues a single catalog query over the convex hull of its
//! points. Candidates are ranked by ascending cloud cover and every point
//! takes the first candidate whose footprint covers it. Ties keep catalog
//! order (stable sort); no further ordering is imposed.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;
use satfeat_core::{
    convex_hull, Catalog, CatalogQuery, ErrorPolicy, Period, PointStore, SatfeatError,
    SceneCandidate, SceneRef,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::partition::Partition;

/// Shared handle to a matched scene; many points point at the same scene.
pub type SceneHandle = Arc<SceneRef>;

#[derive(Debug, Error)]
pub enum MatchError {
    /// Catalog query failed for one partition
    #[error("catalog query for partition {partition} failed: {source}")]
    Catalog {
        partition: usize,
        #[source]
        source: SatfeatError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub collection_id: String,
    /// Exclusive ceiling, percent.
    pub cloud_cover_max: f64,
    pub limit: usize,
}

/// Assignments of one partition, keyed by point store index.
#[derive(Debug, Clone)]
pub struct PartitionMatch {
    pub partition_id: usize,
    pub candidates: usize,
    pub assignments: Vec<(usize, Option<SceneHandle>)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    pub partitions: usize,
    pub failed_partitions: usize,
    pub candidates: usize,
    pub matched_points: usize,
}

/// Scene per point, in point store order.
#[derive(Debug, Clone)]
pub struct PeriodAssignments {
    pub scenes: Vec<Option<SceneHandle>>,
    pub stats: MatchStats,
}

impl PeriodAssignments {
    pub fn scene(&self, index: usize) -> Option<&SceneRef> {
        self.scenes.get(index).and_then(|s| s.as_deref())
    }
}

/// Stable ascending sort by cloud cover; NaN ranks last.
pub fn sort_by_cloud_cover(candidates: &mut [SceneCandidate]) {
    let key = |c: &SceneCandidate| {
        if c.cloud_cover.is_nan() {
            f64::INFINITY
        } else {
            c.cloud_cover
        }
    };
    candidates.sort_by(|a, b| key(a).total_cmp(&key(b)));
}

/// Index of the first candidate (in the given order) covering the point.
pub fn first_covering(candidates: &[SceneCandidate], lon: f64, lat: f64) -> Option<usize> {
    candidates
        .iter()
        .position(|candidate| candidate.footprint.covers(lon, lat))
}

pub struct SceneMatcher<'a> {
    catalog: &'a dyn Catalog,
    config: MatchConfig,
}

impl<'a> SceneMatcher<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: MatchConfig) -> Self {
        Self { catalog, config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// The catalog request for a partition, `None` for an empty partition.
    pub fn query_for(
        &self,
        partition: &Partition,
        store: &PointStore,
        period: Period,
    ) -> Option<CatalogQuery> {
        let hull = convex_hull(&partition.coords(store))?;
        Some(CatalogQuery {
            collection_id: self.config.collection_id.clone(),
            intersects: hull,
            datetime_range: period.datetime_range(),
            cloud_cover_lt: self.config.cloud_cover_max,
            limit: self.config.limit,
        })
    }

    /// One catalog round-trip, then per-point selection.
    pub fn match_partition(
        &self,
        partition: &Partition,
        store: &PointStore,
        period: Period,
    ) -> Result<PartitionMatch, MatchError> {
        let Some(query) = self.query_for(partition, store, period) else {
            return Ok(PartitionMatch {
                partition_id: partition.id,
                candidates: 0,
                assignments: Vec::new(),
            });
        };

        let mut candidates = self
            .catalog
            .search(&query)
            .map_err(|source| MatchError::Catalog {
                partition: partition.id,
                source,
            })?;
        // Exclusive ceiling, also enforced locally.
        candidates.retain(|c| c.cloud_cover.is_nan() || c.cloud_cover < self.config.cloud_cover_max);
        sort_by_cloud_cover(&mut candidates);

        let handles: Vec<SceneHandle> = candidates
            .iter()
            .map(|c| Arc::new(c.scene.clone()))
            .collect();

        let assignments = partition
            .indices
            .iter()
            .map(|&index| {
                let scene = store
                    .get(index)
                    .and_then(|p| first_covering(&candidates, p.lon, p.lat))
                    .map(|pos| Arc::clone(&handles[pos]));
                (index, scene)
            })
            .collect();

        debug!(
            partition = partition.id,
            points = partition.len(),
            candidates = candidates.len(),
            "matched partition for {period}"
        );

        Ok(PartitionMatch {
            partition_id: partition.id,
            candidates: candidates.len(),
            assignments,
        })
    }

    /// Match every partition on `pool` and scatter the result back into
    /// point store order.
    ///
    /// All partitions finish before this returns. A failed partition either
    /// leaves its points unmatched (`Skip`) or fails the whole call
    /// (`Abort`).
    pub fn match_all(
        &self,
        partitions: &[Partition],
        store: &PointStore,
        period: Period,
        pool: &ThreadPool,
        on_error: ErrorPolicy,
    ) -> Result<PeriodAssignments, MatchError> {
        let results: Vec<Result<PartitionMatch, MatchError>> = pool.install(|| {
            partitions
                .par_iter()
                .map(|partition| self.match_partition(partition, store, period))
                .collect()
        });

        let mut scenes: Vec<Option<SceneHandle>> = vec![None; store.len()];
        let mut stats = MatchStats {
            partitions: partitions.len(),
            ..MatchStats::default()
        };

        for result in results {
            match result {
                Ok(matched) => {
                    stats.candidates += matched.candidates;
                    for (index, scene) in matched.assignments {
                        if scene.is_some() {
                            stats.matched_points += 1;
                        }
                        scenes[index] = scene;
                    }
                }
                Err(err) => match on_error {
                    ErrorPolicy::Abort => return Err(err),
                    ErrorPolicy::Skip => {
                        warn!("{err}; treating partition as having no candidates for {period}");
                        stats.failed_partitions += 1;
                    }
                },
            }
        }

        Ok(PeriodAssignments { scenes, stats })
    }
}
