//! Spatial partitioning of sample points for batched catalog search.
//!
//! Every catalog request pays a large fixed latency, so points are grouped
//! into partitions that each issue one query per period. Points are ordered
//! along a Hilbert curve so that each contiguous slice of the ordering is a
//! compact region whose convex hull touches few scene footprints.
//!
//! # Example
//!
//! ```ignore
//! use satfeat_algo::partition::partition_points;
//!
//! let partitions = partition_points(&store, 8)?;
//! let largest = partitions.iter().map(|p| p.len()).max().unwrap_or(0);
//! println!("{} partitions, largest holds {largest} points", partitions.len());
//! ```

use satfeat_core::{Coord, PointStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Curve order; keys address a `2^16 x 2^16` grid over the point bounds.
pub const HILBERT_ORDER: u32 = 16;

/// Error type for partitioning operations.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Partition count must be at least one
    #[error("Invalid partition count: {0}")]
    InvalidPartitionCount(usize),
}

/// Points sharing one catalog query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Partition index (0-based, in curve order)
    pub id: usize,
    /// Indices into the point store, in curve order
    pub indices: Vec<usize>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Member coordinates as `[lon, lat]`.
    pub fn coords(&self, store: &PointStore) -> Vec<Coord> {
        self.indices
            .iter()
            .filter_map(|&i| store.get(i))
            .map(|p| [p.lon, p.lat])
            .collect()
    }
}

/// Hilbert distance of cell `(x, y)` on a `2^order` square grid.
pub fn hilbert_index(order: u32, x: u32, y: u32) -> u64 {
    let n: u64 = 1 << order;
    let (mut x, mut y) = (x as u64, y as u64);
    let mut d: u64 = 0;
    let mut s = n / 2;
    while s > 0 {
        let rx = u64::from(x & s > 0);
        let ry = u64::from(y & s > 0);
        d += s * s * ((3 * rx) ^ ry);
        // Rotate the quadrant so the sub-curve has canonical orientation.
        if ry == 0 {
            if rx == 1 {
                x = n - 1 - x;
                y = n - 1 - y;
            }
            std::mem::swap(&mut x, &mut y);
        }
        s /= 2;
    }
    d
}

/// Hilbert key of every point, with coordinates scaled to the store bounds.
pub fn hilbert_keys(store: &PointStore) -> Vec<u64> {
    let (min_lon, min_lat, max_lon, max_lat) = store.bounds();
    let cells = ((1u64 << HILBERT_ORDER) - 1) as f64;
    let scale = |v: f64, lo: f64, hi: f64| -> u32 {
        let span = hi - lo;
        if span <= 0.0 {
            0
        } else {
            (((v - lo) / span) * cells).round().clamp(0.0, cells) as u32
        }
    };
    store
        .iter()
        .map(|p| {
            hilbert_index(
                HILBERT_ORDER,
                scale(p.lon, min_lon, max_lon),
                scale(p.lat, min_lat, max_lat),
            )
        })
        .collect()
}

/// Split the store into `num_partitions` contiguous runs of the Hilbert
/// ordering.
///
/// Slice sizes differ by at most one (the first `n % k` slices take the
/// extra point). Asking for more partitions than points yields a single
/// partition. Deterministic for a given store and count.
pub fn partition_points(
    store: &PointStore,
    num_partitions: usize,
) -> Result<Vec<Partition>, PartitionError> {
    if num_partitions == 0 {
        return Err(PartitionError::InvalidPartitionCount(num_partitions));
    }
    let n = store.len();
    let k = if num_partitions > n { 1 } else { num_partitions };

    let keys = hilbert_keys(store);
    let mut order: Vec<usize> = (0..n).collect();
    // `sort_by_key` is stable: equal keys keep store order.
    order.sort_by_key(|&i| keys[i]);

    let base = n / k;
    let extra = n % k;
    let mut partitions = Vec::with_capacity(k);
    let mut start = 0;
    for id in 0..k {
        let size = base + usize::from(id < extra);
        partitions.push(Partition {
            id,
            indices: order[start..start + size].to_vec(),
        });
        start += size;
    }
    Ok(partitions)
}

/// Partition count that keeps roughly `points_per_partition` points per query.
pub fn partition_count_for(num_points: usize, points_per_partition: usize) -> usize {
    if points_per_partition == 0 {
        return 1;
    }
    num_points.div_ceil(points_per_partition).max(1)
}
