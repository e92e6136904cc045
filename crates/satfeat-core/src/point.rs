use serde::{Deserialize, Serialize};

use crate::error::{SatfeatError, SatfeatResult};

/// A sample location in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: u64,
    pub lon: f64,
    pub lat: f64,
}

impl Point {
    pub fn new(id: u64, lon: f64, lat: f64) -> Self {
        Self { id, lon, lat }
    }
}

/// The immutable set of sample points for one run.
///
/// Row order of every period table follows the order of this store, so the
/// store never reorders or deduplicates its input. Minimum separation between
/// points is an input contract and is not checked here.
#[derive(Debug, Clone)]
pub struct PointStore {
    points: Vec<Point>,
}

impl PointStore {
    pub fn new(points: Vec<Point>) -> SatfeatResult<Self> {
        if points.is_empty() {
            return Err(SatfeatError::Config("point set is empty".into()));
        }
        for point in &points {
            if !point.lon.is_finite()
                || !point.lat.is_finite()
                || !(-180.0..=180.0).contains(&point.lon)
                || !(-90.0..=90.0).contains(&point.lat)
            {
                return Err(SatfeatError::Config(format!(
                    "point {} has invalid coordinates ({}, {})",
                    point.id, point.lon, point.lat
                )));
            }
        }
        Ok(Self { points })
    }

    /// Builds a store from bare coordinates, using the ordinal as id.
    pub fn from_coords(coords: &[(f64, f64)]) -> SatfeatResult<Self> {
        Self::new(
            coords
                .iter()
                .enumerate()
                .map(|(i, &(lon, lat))| Point::new(i as u64, lon, lat))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    /// Bounding box as `(min_lon, min_lat, max_lon, max_lat)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.points.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), p| (x0.min(p.lon), y0.min(p.lat), x1.max(p.lon), y1.max(p.lat)),
        )
    }

    pub fn lons(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.lon).collect()
    }

    pub fn lats(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.lat).collect()
    }
}
