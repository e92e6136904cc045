//! In-process catalog, scene store and sink.
//!
//! Used by tests and dry runs. The catalog serves fixed candidates and
//! records every query it receives, so callers can assert how many network
//! round-trips a run would have made.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use satfeat_core::{
    Catalog, CatalogQuery, OutputName, PeriodFeatureTable, PeriodSink, PixelWindow, RasterGrid,
    SatfeatError, SatfeatResult, SceneAccess, SceneCandidate, SceneRef,
};

#[derive(Default)]
pub struct InMemoryCatalog {
    candidates: Vec<SceneCandidate>,
    by_datetime: HashMap<String, Vec<SceneCandidate>>,
    failure: Option<String>,
    queries: Mutex<Vec<CatalogQuery>>,
}

impl InMemoryCatalog {
    /// Serve `candidates` for every period.
    pub fn new(candidates: Vec<SceneCandidate>) -> Self {
        Self {
            candidates,
            ..Self::default()
        }
    }

    /// Catalog that fails every query with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Serve `candidates` only for queries with this exact datetime range.
    pub fn with_period(mut self, datetime_range: impl Into<String>, candidates: Vec<SceneCandidate>) -> Self {
        self.by_datetime.insert(datetime_range.into(), candidates);
        self
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn queries(&self) -> Vec<CatalogQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

impl Catalog for InMemoryCatalog {
    fn search(&self, query: &CatalogQuery) -> SatfeatResult<Vec<SceneCandidate>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.clone());
        }
        if let Some(message) = &self.failure {
            return Err(SatfeatError::Catalog(message.clone()));
        }
        let source = self
            .by_datetime
            .get(&query.datetime_range)
            .unwrap_or(&self.candidates);
        Ok(source
            .iter()
            .filter(|c| c.cloud_cover < query.cloud_cover_lt)
            .take(query.limit)
            .cloned()
            .collect())
    }
}

/// Synthetic band rasters keyed by scene id and band.
#[derive(Default)]
pub struct InMemoryScenes {
    bands: HashMap<(String, String), (RasterGrid, Vec<f32>)>,
}

impl InMemoryScenes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a row-major raster for one band of one scene.
    pub fn insert(
        &mut self,
        scene_id: impl Into<String>,
        band: impl Into<String>,
        grid: RasterGrid,
        pixels: Vec<f32>,
    ) -> SatfeatResult<()> {
        if pixels.len() != grid.width * grid.height {
            return Err(SatfeatError::Raster(format!(
                "{} pixels for a {}x{} grid",
                pixels.len(),
                grid.width,
                grid.height
            )));
        }
        self.bands.insert((scene_id.into(), band.into()), (grid, pixels));
        Ok(())
    }

    /// Register a raster whose pixels are `f(col, row)`.
    pub fn insert_with(
        &mut self,
        scene_id: impl Into<String>,
        band: impl Into<String>,
        grid: RasterGrid,
        f: impl Fn(usize, usize) -> f32,
    ) -> SatfeatResult<()> {
        let pixels = (0..grid.height)
            .flat_map(|row| (0..grid.width).map(move |col| (col, row)))
            .map(|(col, row)| f(col, row))
            .collect();
        self.insert(scene_id, band, grid, pixels)
    }

    fn band(&self, scene: &SceneRef, band: &str) -> SatfeatResult<&(RasterGrid, Vec<f32>)> {
        self.bands
            .get(&(scene.id.clone(), band.to_string()))
            .ok_or_else(|| {
                SatfeatError::Raster(format!("scene {} has no band {band}", scene.id))
            })
    }
}

impl SceneAccess for InMemoryScenes {
    fn band_grid(&self, scene: &SceneRef, band: &str) -> SatfeatResult<RasterGrid> {
        Ok(self.band(scene, band)?.0)
    }

    fn read_window(
        &self,
        scene: &SceneRef,
        band: &str,
        window: PixelWindow,
    ) -> SatfeatResult<Vec<f32>> {
        let (grid, pixels) = self.band(scene, band)?;
        if !grid.contains_window(&window) {
            return Err(SatfeatError::Raster(format!(
                "window {window:?} outside band {band} of scene {}",
                scene.id
            )));
        }
        let mut out = Vec::with_capacity(window.len());
        for row in window.row_off..window.row_off + window.height {
            let start = row * grid.width + window.col_off;
            out.extend_from_slice(&pixels[start..start + window.width]);
        }
        Ok(out)
    }
}

/// Keeps every persisted table in memory, in persist order.
#[derive(Default)]
pub struct MemorySink {
    tables: Vec<(OutputName, PeriodFeatureTable)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &[(OutputName, PeriodFeatureTable)] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl PeriodSink for MemorySink {
    fn persist(&mut self, table: &PeriodFeatureTable, name: &OutputName) -> SatfeatResult<PathBuf> {
        self.tables.push((name.clone(), table.clone()));
        Ok(PathBuf::from(name.file_name("parquet")))
    }
}
