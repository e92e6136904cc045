//! Windowed reads of single-band GeoTIFF assets.
//!
//! Georeferencing comes from the model tiepoint, pixel scale and GeoKey
//! directory tags (north-up rasters only). Only the strips or tiles that
//! intersect a requested window are decoded.
//!
//! Remote `http(s)` assets are reached one of two ways, see [`RemoteAccess`]:
//! HTTP range requests that fetch the header and the intersecting chunks, or
//! whole-file downloads into a cache directory keyed by the SHA-256 of the
//! URL. Downloads are staged in a unique temp file per caller and serialised
//! per URL; [`SceneAccess::release`] deletes them at the end of each period.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use satfeat_core::{
    Crs, PixelWindow, RasterGrid, SatfeatError, SatfeatResult, SceneAccess, SceneRef,
};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, info, warn};

use crate::range::{HttpRangeReader, DEFAULT_BLOCK_SIZE};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;

const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// How `http(s)` assets are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAccess {
    /// Range requests for the header and the chunks a window needs.
    Ranged,
    /// Whole-file downloads into this directory, removed on release.
    Cached(PathBuf),
}

/// Where the bytes of one asset come from.
enum Source<'h> {
    Local(PathBuf),
    Remote(&'h str),
}

pub struct GeoTiffScenes {
    remote: RemoteAccess,
    agent: ureq::Agent,
    block_size: u64,
    grids: Mutex<HashMap<String, RasterGrid>>,
    /// One lock per remote href so concurrent readers download it once.
    downloads: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Files downloaded since the last release.
    downloaded: Mutex<Vec<PathBuf>>,
}

impl GeoTiffScenes {
    pub fn new(remote: RemoteAccess) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(120))
            .build();
        Self {
            remote,
            agent,
            block_size: DEFAULT_BLOCK_SIZE,
            grids: Mutex::new(HashMap::new()),
            downloads: Mutex::new(HashMap::new()),
            downloaded: Mutex::new(Vec::new()),
        }
    }

    pub fn ranged() -> Self {
        Self::new(RemoteAccess::Ranged)
    }

    pub fn cached(cache_dir: impl Into<PathBuf>) -> Self {
        Self::new(RemoteAccess::Cached(cache_dir.into()))
    }

    /// Bytes per range request in [`RemoteAccess::Ranged`] mode.
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn remote(&self) -> &RemoteAccess {
        &self.remote
    }

    fn href<'s>(&self, scene: &'s SceneRef, band: &str) -> SatfeatResult<&'s str> {
        scene.asset(band).ok_or_else(|| {
            SatfeatError::Raster(format!("scene {} has no asset for band {band}", scene.id))
        })
    }

    fn source<'h>(&self, href: &'h str) -> Result<Source<'h>> {
        if !(href.starts_with("http://") || href.starts_with("https://")) {
            let path = href.strip_prefix("file://").unwrap_or(href);
            return Ok(Source::Local(PathBuf::from(path)));
        }
        match &self.remote {
            RemoteAccess::Ranged => Ok(Source::Remote(href)),
            RemoteAccess::Cached(dir) => self.download_once(dir, href).map(Source::Local),
        }
    }

    /// Cached copy of `href`, downloading it if no other caller has.
    fn download_once(&self, dir: &Path, href: &str) -> Result<PathBuf> {
        let dest = dir.join(cache_file_name(href));
        if dest.exists() {
            return Ok(dest);
        }
        let lock = {
            let mut downloads = self
                .downloads
                .lock()
                .map_err(|_| anyhow!("download registry poisoned"))?;
            Arc::clone(downloads.entry(href.to_string()).or_default())
        };
        let _guard = lock
            .lock()
            .map_err(|_| anyhow!("download lock for {href} poisoned"))?;
        if dest.exists() {
            return Ok(dest);
        }

        fs::create_dir_all(dir)
            .with_context(|| format!("creating raster cache {}", dir.display()))?;
        download_to_path(&self.agent, href, &dest)?;
        if let Ok(mut downloaded) = self.downloaded.lock() {
            downloaded.push(dest.clone());
        }
        Ok(dest)
    }

    fn open_remote(&self, url: &str) -> Result<Decoder<HttpRangeReader>> {
        let reader = HttpRangeReader::open(self.agent.clone(), url, self.block_size)
            .with_context(|| format!("opening {url}"))?;
        let decoder =
            Decoder::new(reader).with_context(|| format!("reading TIFF header of {url}"))?;
        Ok(decoder.with_limits(Limits::unlimited()))
    }

    fn grid_for(&self, href: &str) -> Result<RasterGrid> {
        if let Some(grid) = self.cached_grid(href) {
            return Ok(grid);
        }
        let grid = match self.source(href)? {
            Source::Local(path) => read_grid(&mut open_decoder(&path)?),
            Source::Remote(url) => read_grid(&mut self.open_remote(url)?),
        }
        .with_context(|| format!("georeferencing {href}"))?;
        if let Ok(mut grids) = self.grids.lock() {
            grids.insert(href.to_string(), grid);
        }
        Ok(grid)
    }

    fn cached_grid(&self, href: &str) -> Option<RasterGrid> {
        self.grids.lock().ok()?.get(href).copied()
    }

    fn window_for(&self, href: &str, window: PixelWindow) -> Result<Vec<f32>> {
        match self.source(href)? {
            Source::Local(path) => read_window_from(&path, window),
            Source::Remote(url) => read_chunks(&mut self.open_remote(url)?, window, url),
        }
    }
}

impl SceneAccess for GeoTiffScenes {
    fn band_grid(&self, scene: &SceneRef, band: &str) -> SatfeatResult<RasterGrid> {
        let href = self.href(scene, band)?;
        self.grid_for(href)
            .map_err(|err| SatfeatError::Raster(format!("{err:#}")))
    }

    fn read_window(
        &self,
        scene: &SceneRef,
        band: &str,
        window: PixelWindow,
    ) -> SatfeatResult<Vec<f32>> {
        let href = self.href(scene, band)?;
        self.window_for(href, window)
            .map_err(|err| SatfeatError::Raster(format!("{err:#}")))
    }

    /// Forget cached grids and delete every file downloaded since the last call.
    fn release(&self) {
        if let Ok(mut grids) = self.grids.lock() {
            grids.clear();
        }
        if let Ok(mut downloads) = self.downloads.lock() {
            downloads.clear();
        }
        let files = self
            .downloaded
            .lock()
            .map(|mut downloaded| std::mem::take(&mut *downloaded))
            .unwrap_or_default();
        for path in files {
            match fs::remove_file(&path) {
                Ok(()) => debug!("removed cached raster {}", path.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!("failed to remove cached raster {}: {err}", path.display()),
            }
        }
    }
}

/// Cache file for a remote asset: hex SHA-256 of the URL plus its extension.
pub fn cache_file_name(href: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(href.as_bytes()));
    let ext = Path::new(href.split('?').next().unwrap_or(href))
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("tif");
    format!("{digest}.{ext}")
}

/// Stream `url` into a temp file beside `dest`, then move it into place.
fn download_to_path(agent: &ureq::Agent, url: &str, dest: &Path) -> Result<()> {
    info!("downloading {url}");
    let response = agent.get(url).call().map_err(|err| match err {
        ureq::Error::Status(code, _) => anyhow!("failed to download {url}: HTTP {code}"),
        other => anyhow!("requesting {url}: {other}"),
    })?;
    let dir = dest
        .parent()
        .ok_or_else(|| anyhow!("cache path {} has no directory", dest.display()))?;
    let mut staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating download target in {}", dir.display()))?;
    io::copy(&mut response.into_reader(), &mut staged)
        .with_context(|| format!("writing raster to {}", staged.path().display()))?;
    staged
        .persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("moving download into {}", dest.display()))?;
    Ok(())
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("opening raster {}", path.display()))?;
    let decoder = Decoder::new(BufReader::new(file))
        .with_context(|| format!("reading TIFF header of {}", path.display()))?;
    Ok(decoder.with_limits(Limits::unlimited()))
}

fn read_grid<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<RasterGrid> {
    let (width, height) = decoder.dimensions()?;
    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
        .context("missing ModelPixelScale tag")?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT))
        .context("missing ModelTiepoint tag")?;
    let keys = decoder
        .get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))
        .context("missing GeoKeyDirectory tag")?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        bail!("malformed georeferencing tags");
    }
    let epsg = epsg_from_geokeys(&keys).ok_or_else(|| anyhow!("no EPSG code in GeoKeys"))?;
    let crs = Crs::from_epsg(epsg)?;

    let (pixel_width, pixel_height) = (scale[0], scale[1]);
    Ok(RasterGrid {
        crs,
        origin_x: tiepoint[3] - tiepoint[0] * pixel_width,
        origin_y: tiepoint[4] + tiepoint[1] * pixel_height,
        pixel_width,
        pixel_height,
        width: width as usize,
        height: height as usize,
    })
}

/// Projected CRS key if present, else the geographic one.
pub fn epsg_from_geokeys(keys: &[u16]) -> Option<u32> {
    let count = *keys.get(3)? as usize;
    let entries: Vec<&[u16]> = keys.get(4..4 + count * 4)?.chunks(4).collect();
    let lookup = |id: u16| {
        entries
            .iter()
            // Location 0 means the value is stored inline.
            .find(|e| e[0] == id && e[1] == 0)
            .map(|e| e[3] as u32)
            .filter(|code| *code != 0 && *code != 32767)
    };
    lookup(PROJECTED_CS_TYPE_KEY).or_else(|| lookup(GEOGRAPHIC_TYPE_KEY))
}

/// Decode only the chunks of a local file intersecting `window`.
pub fn read_window_from(path: &Path, window: PixelWindow) -> Result<Vec<f32>> {
    let mut decoder = open_decoder(path)?;
    read_chunks(&mut decoder, window, &path.display().to_string())
}

/// Decode the chunks intersecting `window` into a row-major buffer.
fn read_chunks<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    window: PixelWindow,
    label: &str,
) -> Result<Vec<f32>> {
    let (width, height) = decoder.dimensions()?;
    if window.is_empty()
        || window.col_off + window.width > width as usize
        || window.row_off + window.height > height as usize
    {
        bail!("window {:?} outside {}x{} raster {}", window, width, height, label);
    }

    let (chunk_w, chunk_h) = decoder.chunk_dimensions();
    let (chunk_w, chunk_h) = (chunk_w as usize, chunk_h as usize);
    let chunks_across = (width as usize).div_ceil(chunk_w);

    let mut out = vec![0.0f32; window.len()];
    let first_chunk_row = window.row_off / chunk_h;
    let last_chunk_row = (window.row_off + window.height - 1) / chunk_h;
    let first_chunk_col = window.col_off / chunk_w;
    let last_chunk_col = (window.col_off + window.width - 1) / chunk_w;

    for chunk_row in first_chunk_row..=last_chunk_row {
        for chunk_col in first_chunk_col..=last_chunk_col {
            let index = (chunk_row * chunks_across + chunk_col) as u32;
            let (data_w, data_h) = decoder.chunk_data_dimensions(index);
            let data = decoding_to_f32(
                decoder
                    .read_chunk(index)
                    .with_context(|| format!("decoding chunk {index} of {label}"))?,
            )?;
            let stride = data_w as usize;
            if data.len() < stride * data_h as usize {
                bail!("chunk {index} of {label} has multiple samples per pixel");
            }

            let x0 = chunk_col * chunk_w;
            let y0 = chunk_row * chunk_h;
            let col_start = window.col_off.max(x0);
            let col_end = (window.col_off + window.width).min(x0 + stride);
            let row_start = window.row_off.max(y0);
            let row_end = (window.row_off + window.height).min(y0 + data_h as usize);
            for row in row_start..row_end {
                let src = (row - y0) * stride;
                let dst = (row - window.row_off) * window.width;
                for col in col_start..col_end {
                    out[dst + col - window.col_off] = data[src + col - x0];
                }
            }
        }
    }
    debug!(?window, "read window from {label}");
    Ok(out)
}

fn decoding_to_f32(result: DecodingResult) -> Result<Vec<f32>> {
    Ok(match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => bail!("unsupported TIFF sample format"),
    })
}
