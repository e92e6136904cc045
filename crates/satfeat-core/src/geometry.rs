//! Planar geometry in lon/lat degrees.
//!
//! Only what scene matching needs: GeoJSON conversion for catalog requests
//! and responses, a convex hull for partition queries, and a coverage test
//! for footprints. Coordinates are `[lon, lat]` pairs as in GeoJSON.

use serde_json::{json, Value};

use crate::error::{SatfeatError, SatfeatResult};

pub type Coord = [f64; 2];

const EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    LineString(Vec<Coord>),
    /// Rings; the first is the exterior, the rest are holes.
    Polygon(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Containment {
    Inside,
    Boundary,
    Outside,
}

impl Geometry {
    /// Axis-aligned polygon `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn bbox(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Geometry::Polygon(vec![vec![
            [min_lon, min_lat],
            [max_lon, min_lat],
            [max_lon, max_lat],
            [min_lon, max_lat],
            [min_lon, min_lat],
        ]])
    }

    /// True when the point lies inside the geometry or on its boundary.
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        let p = [lon, lat];
        match self {
            Geometry::Point(c) => (c[0] - lon).abs() <= EPS && (c[1] - lat).abs() <= EPS,
            Geometry::LineString(coords) => coords.windows(2).any(|w| on_segment(p, w[0], w[1])),
            Geometry::Polygon(rings) => polygon_covers(rings, p),
            Geometry::MultiPolygon(polygons) => polygons.iter().any(|rings| polygon_covers(rings, p)),
        }
    }

    pub fn to_geojson(&self) -> Value {
        match self {
            Geometry::Point(c) => json!({"type": "Point", "coordinates": c}),
            Geometry::LineString(coords) => json!({"type": "LineString", "coordinates": coords}),
            Geometry::Polygon(rings) => json!({"type": "Polygon", "coordinates": rings}),
            Geometry::MultiPolygon(polys) => json!({"type": "MultiPolygon", "coordinates": polys}),
        }
    }

    pub fn from_geojson(value: &Value) -> SatfeatResult<Self> {
        let kind = value["type"]
            .as_str()
            .ok_or_else(|| SatfeatError::Parse("geometry has no 'type'".into()))?;
        let coords = &value["coordinates"];
        match kind {
            "Point" => Ok(Geometry::Point(parse_coord(coords)?)),
            "LineString" => Ok(Geometry::LineString(parse_ring(coords)?)),
            "Polygon" => Ok(Geometry::Polygon(parse_rings(coords)?)),
            "MultiPolygon" => {
                let polys = coords
                    .as_array()
                    .ok_or_else(|| SatfeatError::Parse("MultiPolygon coordinates".into()))?
                    .iter()
                    .map(parse_rings)
                    .collect::<SatfeatResult<Vec<_>>>()?;
                Ok(Geometry::MultiPolygon(polys))
            }
            other => Err(SatfeatError::Parse(format!(
                "unsupported geometry type '{other}'"
            ))),
        }
    }
}

/// Convex hull of a point cloud (Andrew's monotone chain).
///
/// A single distinct point yields `Point`, collinear input yields the
/// `LineString` between its extremes, otherwise a closed counter-clockwise
/// `Polygon`.
pub fn convex_hull(points: &[Coord]) -> Option<Geometry> {
    let mut pts: Vec<Coord> = points.to_vec();
    pts.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    pts.dedup();
    match pts.len() {
        0 => return None,
        1 => return Some(Geometry::Point(pts[0])),
        _ => {}
    }

    let mut lower: Vec<Coord> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Coord> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    let mut ring = lower;
    ring.extend(upper);

    if ring.len() < 3 {
        let first = pts[0];
        let last = pts[pts.len() - 1];
        return Some(Geometry::LineString(vec![first, last]));
    }
    ring.push(ring[0]);
    Some(Geometry::Polygon(vec![ring]))
}

fn cross(o: Coord, a: Coord, b: Coord) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

fn on_segment(p: Coord, a: Coord, b: Coord) -> bool {
    let scale = (b[0] - a[0]).abs().max((b[1] - a[1]).abs()).max(1.0);
    if cross(a, b, p).abs() > EPS * scale {
        return false;
    }
    p[0] >= a[0].min(b[0]) - EPS
        && p[0] <= a[0].max(b[0]) + EPS
        && p[1] >= a[1].min(b[1]) - EPS
        && p[1] <= a[1].max(b[1]) + EPS
}

fn ring_containment(ring: &[Coord], p: Coord) -> Containment {
    if ring.len() < 3 {
        return Containment::Outside;
    }
    let mut inside = false;
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        if on_segment(p, a, b) {
            return Containment::Boundary;
        }
        if (a[1] > p[1]) != (b[1] > p[1]) {
            let x = a[0] + (p[1] - a[1]) * (b[0] - a[0]) / (b[1] - a[1]);
            if p[0] < x {
                inside = !inside;
            }
        }
    }
    if inside {
        Containment::Inside
    } else {
        Containment::Outside
    }
}

fn polygon_covers(rings: &[Vec<Coord>], p: Coord) -> bool {
    let Some((exterior, holes)) = rings.split_first() else {
        return false;
    };
    if ring_containment(exterior, p) == Containment::Outside {
        return false;
    }
    holes
        .iter()
        .all(|hole| ring_containment(hole, p) != Containment::Inside)
}

fn parse_coord(value: &Value) -> SatfeatResult<Coord> {
    let arr = value
        .as_array()
        .filter(|a| a.len() >= 2)
        .ok_or_else(|| SatfeatError::Parse(format!("invalid coordinate {value}")))?;
    match (arr[0].as_f64(), arr[1].as_f64()) {
        (Some(x), Some(y)) => Ok([x, y]),
        _ => Err(SatfeatError::Parse(format!("invalid coordinate {value}"))),
    }
}

fn parse_ring(value: &Value) -> SatfeatResult<Vec<Coord>> {
    value
        .as_array()
        .ok_or_else(|| SatfeatError::Parse("coordinate list expected".into()))?
        .iter()
        .map(parse_coord)
        .collect()
}

fn parse_rings(value: &Value) -> SatfeatResult<Vec<Vec<Coord>>> {
    value
        .as_array()
        .ok_or_else(|| SatfeatError::Parse("ring list expected".into()))?
        .iter()
        .map(parse_ring)
        .collect()
}
