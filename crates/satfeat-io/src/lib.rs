//! # satfeat-io: catalog, raster, point and table I/O
//!
//! Concrete implementations of the collaborator traits from `satfeat-core`:
//!
//! | Trait | Network / disk | In memory |
//! |-------|----------------|-----------|
//! | `Catalog` | [`StacCatalog`] (STAC API `POST /search`) | [`InMemoryCatalog`] |
//! | `SceneAccess` | [`GeoTiffScenes`] (GeoTIFF, range reads or download cache) | [`InMemoryScenes`] |
//! | `PeriodSink` | [`ParquetSink`] (staged Parquet writes) | [`MemorySink`] |
//!
//! Point sets are read with [`load_points`] from CSV or Parquet.

#[cfg(test)]
mod fixture_server;
pub mod geotiff;
pub mod memory;
pub mod points;
pub mod range;
pub mod sink;
pub mod stac;

pub use geotiff::{cache_file_name, GeoTiffScenes, RemoteAccess};
pub use memory::{InMemoryCatalog, InMemoryScenes, MemorySink};
pub use points::load_points;
pub use range::HttpRangeReader;
pub use sink::{read_period_table, table_frame, ParquetSink, STAGING_DIR};
pub use stac::{StacCatalog, DEFAULT_CLOUD_COVER_PROPERTY};
