//! Scene metadata and the two external collaborators: the catalog that finds
//! scenes, and the raster store that serves their pixels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crs::Crs;
use crate::error::SatfeatResult;
use crate::geometry::Geometry;

/// A resolved catalog item: enough to address its band rasters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRef {
    pub id: String,
    pub collection: String,
    /// Band identifier -> asset location (path or URL).
    pub assets: BTreeMap<String, String>,
}

impl SceneRef {
    pub fn new(id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            assets: BTreeMap::new(),
        }
    }

    pub fn with_asset(mut self, band: impl Into<String>, href: impl Into<String>) -> Self {
        self.assets.insert(band.into(), href.into());
        self
    }

    pub fn asset(&self, band: &str) -> Option<&str> {
        self.assets.get(band).map(String::as_str)
    }
}

/// One catalog hit for a partition query. Lives for a single period.
#[derive(Debug, Clone)]
pub struct SceneCandidate {
    pub scene: SceneRef,
    pub cloud_cover: f64,
    pub footprint: Geometry,
}

/// The single request issued per partition per period.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub collection_id: String,
    pub intersects: Geometry,
    /// Inclusive `YYYY-MM-DD/YYYY-MM-DD`.
    pub datetime_range: String,
    /// Exclusive upper bound, percent.
    pub cloud_cover_lt: f64,
    pub limit: usize,
}

/// Scene search service. A zero-length result is valid and means no
/// acceptable imagery.
pub trait Catalog: Send + Sync {
    fn search(&self, query: &CatalogQuery) -> SatfeatResult<Vec<SceneCandidate>>;
}

/// North-up pixel grid of one band raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterGrid {
    pub crs: Crs,
    /// Left edge of the first column.
    pub origin_x: f64,
    /// Top edge of the first row.
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Positive; rows go south.
    pub pixel_height: f64,
    pub width: usize,
    pub height: usize,
}

/// A rectangular block of pixels, in raster coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl RasterGrid {
    /// `(min_x, min_y, max_x, max_y)` in grid CRS units.
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        (
            self.origin_x,
            self.origin_y - self.pixel_height * self.height as f64,
            self.origin_x + self.pixel_width * self.width as f64,
            self.origin_y,
        )
    }

    /// Fractional `(col, row)` of a CRS coordinate.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }

    /// Pixels touching the box, clipped to the raster. `None` when the box
    /// misses the raster entirely.
    pub fn window_for(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Option<PixelWindow> {
        let (c0, r0) = self.to_pixel(min_x, max_y);
        let (c1, r1) = self.to_pixel(max_x, min_y);
        let col_start = c0.floor().max(0.0);
        let row_start = r0.floor().max(0.0);
        let col_end = c1.ceil().min(self.width as f64);
        let row_end = r1.ceil().min(self.height as f64);
        if !(col_end > col_start && row_end > row_start) {
            return None;
        }
        Some(PixelWindow {
            col_off: col_start as usize,
            row_off: row_start as usize,
            width: (col_end - col_start) as usize,
            height: (row_end - row_start) as usize,
        })
    }

    pub fn contains_window(&self, window: &PixelWindow) -> bool {
        window.col_off + window.width <= self.width && window.row_off + window.height <= self.height
    }
}

/// Band raster store for resolved scenes. Reads are windowed so a worker
/// never materialises a full scene.
pub trait SceneAccess: Send + Sync {
    fn band_grid(&self, scene: &SceneRef, band: &str) -> SatfeatResult<RasterGrid>;

    /// Row-major pixel values of `window`; the window lies inside the grid.
    fn read_window(&self, scene: &SceneRef, band: &str, window: PixelWindow)
        -> SatfeatResult<Vec<f32>>;

    /// Drop per-period state such as downloaded assets. Called between periods.
    fn release(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> RasterGrid {
        RasterGrid {
            crs: Crs::Utm { zone: 31, north: true },
            origin_x: 300_000.0,
            origin_y: 5_000_000.0,
            pixel_width: 10.0,
            pixel_height: 10.0,
            width: 100,
            height: 50,
        }
    }

    #[test]
    fn window_is_clipped_to_extent() {
        let g = grid();
        let w = g.window_for(299_950.0, 4_999_900.0, 300_055.0, 5_000_100.0).unwrap();
        assert_eq!(w, PixelWindow { col_off: 0, row_off: 0, width: 6, height: 10 });
        assert!(g.contains_window(&w));
    }

    #[test]
    fn disjoint_box_has_no_window() {
        let g = grid();
        assert_eq!(g.window_for(0.0, 0.0, 10.0, 10.0), None);
        let (min_x, min_y, max_x, max_y) = g.extent();
        assert_eq!((min_x, min_y, max_x, max_y), (300_000.0, 4_999_500.0, 301_000.0, 5_000_000.0));
    }

    #[test]
    fn scene_assets_lookup() {
        let scene = SceneRef::new("S2A_1", "sentinel-2-l2a").with_asset("B04", "/tmp/b04.tif");
        assert_eq!(scene.asset("B04"), Some("/tmp/b04.tif"));
        assert_eq!(scene.asset("B08"), None);
    }
}
