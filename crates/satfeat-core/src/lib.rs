//! # satfeat-core: data model for point-wise satellite featurization
//!
//! A run takes a fixed set of sample points and, for every calendar month in
//! a range, produces one table holding a random convolutional feature vector
//! per point. This crate defines the vocabulary shared by every stage:
//!
//! - [`PointStore`] - the immutable input points, in output row order
//! - [`Period`] - one calendar month and its inclusive day range
//! - [`SceneRef`] / [`SceneCandidate`] - catalog items and their footprints
//! - [`Patch`] / [`PatchOutcome`] - per-point pixel windows, or why there is none
//! - [`FeatureMatrix`] / [`PeriodFeatureTable`] - the zero-filled output
//! - [`Geometry`] and [`Crs`] - just enough geometry to match and window scenes
//!
//! External services are reached through three traits so the pipeline can run
//! against HTTP/GeoTIFF backends or in-memory fixtures:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`Catalog`] | find scenes for a geometry, period and cloud ceiling |
//! | [`SceneAccess`] | windowed reads of band rasters |
//! | [`PeriodSink`] | persist one finished period table |

pub mod crs;
pub mod error;
pub mod features;
pub mod geometry;
pub mod output;
pub mod period;
pub mod point;
pub mod scene;

pub use crs::Crs;
pub use error::{ErrorPolicy, SatfeatError, SatfeatResult};
pub use features::{
    FeatureMatrix, FeatureVector, OutcomeCounts, Patch, PatchOutcome, PeriodFeatureTable,
};
pub use geometry::{convex_hull, Coord, Geometry};
pub use output::{band_short_code, OutputName, PeriodSink};
pub use period::Period;
pub use point::{Point, PointStore};
pub use scene::{Catalog, CatalogQuery, PixelWindow, RasterGrid, SceneAccess, SceneCandidate, SceneRef};
