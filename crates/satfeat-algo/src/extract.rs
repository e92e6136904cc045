//! Patch extraction: a small multi-band window around each point.
//!
//! **Algorithm:**
//! 1. Square window of half-width `buffer_deg` around the point, in degrees.
//! 2. Window projected into the CRS of the first requested band and clipped
//!    to that band's extent.
//! 3. Target grid at `resolution` (native CRS units) over the clipped window;
//!    a resolution coarser than the window fails, undersized grids stop here
//!    without reading pixels.
//! 4. Each band read through [`SceneAccess::read_window`] and nearest-neighbour
//!    resampled onto the target grid, so 10 m and 20 m bands stack cleanly.
//! 5. Per-patch min-max normalisation to `[0, 1]` across all bands.
//!
//! Every failure becomes a [`PatchOutcome`] variant; nothing propagates to
//! neighbouring points.

use std::panic::AssertUnwindSafe;

use rayon::prelude::*;
use rayon::ThreadPool;
use satfeat_core::{
    Patch, PatchOutcome, PixelWindow, Point, RasterGrid, SatfeatError, SatfeatResult,
    SceneAccess, SceneRef,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractConfig {
    pub bands: Vec<String>,
    /// Half-width of the window, degrees.
    pub buffer_deg: f64,
    /// Target pixel size in the scene CRS units.
    pub resolution: f64,
    /// Minimum height and width, pixels.
    pub min_patch_edge: usize,
    /// Pixel value treated like a missing value.
    pub nodata: Option<f32>,
}

pub struct PatchExtractor<'a> {
    scenes: &'a dyn SceneAccess,
    config: ExtractConfig,
}

/// Target grid of one patch, in scene CRS units.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TargetGrid {
    min_x: f64,
    max_y: f64,
    resolution: f64,
    width: usize,
    height: usize,
}

impl<'a> PatchExtractor<'a> {
    pub fn new(scenes: &'a dyn SceneAccess, config: ExtractConfig) -> Self {
        Self { scenes, config }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Extract one point. Unmatched points never touch the scene store.
    pub fn extract(&self, point: &Point, scene: Option<&SceneRef>) -> PatchOutcome {
        let Some(scene) = scene else {
            return PatchOutcome::Unmatched;
        };
        // Decoders may panic on corrupt input; that is a per-point failure.
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| self.try_extract(point, scene)));
        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => PatchOutcome::Failed(err.to_string()),
            Err(_) => PatchOutcome::Failed(format!(
                "panic while reading scene {} for point {}",
                scene.id, point.id
            )),
        }
    }

    /// Extract a batch on `pool`, preserving input order.
    pub fn extract_batch(
        &self,
        items: &[(usize, Point, Option<&SceneRef>)],
        pool: &ThreadPool,
    ) -> Vec<(usize, PatchOutcome)> {
        pool.install(|| {
            items
                .par_iter()
                .map(|(index, point, scene)| (*index, self.extract(point, *scene)))
                .collect()
        })
    }

    fn try_extract(&self, point: &Point, scene: &SceneRef) -> SatfeatResult<PatchOutcome> {
        let first_band = self
            .config
            .bands
            .first()
            .ok_or_else(|| SatfeatError::Config("no bands requested".into()))?;
        let reference = self.scenes.band_grid(scene, first_band)?;

        let Some(target) = self.target_grid(point, &reference)? else {
            return Ok(PatchOutcome::Undersized {
                height: 0,
                width: 0,
            });
        };
        if target.height < self.config.min_patch_edge || target.width < self.config.min_patch_edge {
            return Ok(PatchOutcome::Undersized {
                height: target.height,
                width: target.width,
            });
        }

        let plane = target.width * target.height;
        let mut data = Vec::with_capacity(plane * self.config.bands.len());
        for band in &self.config.bands {
            let grid = if band == first_band {
                reference
            } else {
                self.scenes.band_grid(scene, band)?
            };
            if grid.crs != reference.crs {
                return Err(SatfeatError::Raster(format!(
                    "band {band} of scene {} is in {} but {first_band} is in {}",
                    scene.id, grid.crs, reference.crs
                )));
            }
            data.extend(self.read_resampled(scene, band, &grid, &target)?);
        }

        if !normalize_min_max(&mut data, self.config.nodata) {
            return Ok(PatchOutcome::Constant);
        }
        let patch = Patch::new(self.config.bands.len(), target.height, target.width, data)?;
        Ok(PatchOutcome::Valid(patch))
    }

    /// `None` when the window misses the raster. A resolution coarser than
    /// the whole unclipped window is an error, not an edge case.
    fn target_grid(
        &self,
        point: &Point,
        reference: &RasterGrid,
    ) -> SatfeatResult<Option<TargetGrid>> {
        let b = self.config.buffer_deg;
        let (x0, y0, x1, y1) = reference
            .crs
            .project_bounds(point.lon - b, point.lat - b, point.lon + b, point.lat + b);
        let res = self.config.resolution;
        let span = (x1 - x0).min(y1 - y0);
        if res > span {
            return Err(SatfeatError::Config(format!(
                "resolution {res} is coarser than the {span:.6} wide window in {} (resolution is in scene CRS units)",
                reference.crs
            )));
        }
        let (ex0, ey0, ex1, ey1) = reference.extent();
        let (min_x, min_y) = (x0.max(ex0), y0.max(ey0));
        let (max_x, max_y) = (x1.min(ex1), y1.min(ey1));
        if !(max_x > min_x && max_y > min_y) {
            return Ok(None);
        }
        Ok(Some(TargetGrid {
            min_x,
            max_y,
            resolution: res,
            width: ((max_x - min_x) / res).floor() as usize,
            height: ((max_y - min_y) / res).floor() as usize,
        }))
    }

    fn read_resampled(
        &self,
        scene: &SceneRef,
        band: &str,
        grid: &RasterGrid,
        target: &TargetGrid,
    ) -> SatfeatResult<Vec<f32>> {
        let max_x = target.min_x + target.width as f64 * target.resolution;
        let min_y = target.max_y - target.height as f64 * target.resolution;
        let window = grid
            .window_for(target.min_x, min_y, max_x, target.max_y)
            .ok_or_else(|| {
                SatfeatError::Raster(format!("window misses band {band} of scene {}", scene.id))
            })?;
        let pixels = self.scenes.read_window(scene, band, window)?;
        if pixels.len() != window.len() {
            return Err(SatfeatError::Raster(format!(
                "band {band} returned {} pixels for a {}x{} window",
                pixels.len(),
                window.width,
                window.height
            )));
        }
        Ok(resample_nearest(&pixels, grid, &window, target))
    }
}

fn resample_nearest(
    pixels: &[f32],
    grid: &RasterGrid,
    window: &PixelWindow,
    target: &TargetGrid,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(target.width * target.height);
    for row in 0..target.height {
        let y = target.max_y - (row as f64 + 0.5) * target.resolution;
        for col in 0..target.width {
            let x = target.min_x + (col as f64 + 0.5) * target.resolution;
            let (c, r) = grid.to_pixel(x, y);
            let wc = (c.floor() - window.col_off as f64).clamp(0.0, (window.width - 1) as f64);
            let wr = (r.floor() - window.row_off as f64).clamp(0.0, (window.height - 1) as f64);
            out.push(pixels[wr as usize * window.width + wc as usize]);
        }
    }
    out
}

/// Min-max scale `data` in place to `[0, 1]` using its own extremes.
///
/// Non-finite values and `nodata` are excluded from the extremes and written
/// as 0. Returns `false` (leaving `data` unspecified) when there is no
/// contrast: no usable value, or all usable values equal.
pub fn normalize_min_max(data: &mut [f32], nodata: Option<f32>) -> bool {
    let usable = |v: f32| v.is_finite() && Some(v) != nodata;
    let (min, max) = data
        .iter()
        .copied()
        .filter(|&v| usable(v))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(max > min) {
        return false;
    }
    let span = max - min;
    for value in data.iter_mut() {
        *value = if usable(*value) {
            (*value - min) / span
        } else {
            0.0
        };
    }
    true
}
