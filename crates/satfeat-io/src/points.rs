//! Sample point loading from CSV or Parquet.
//!
//! Both formats carry `lon` and `lat` columns and an optional `id`; rows
//! without an id are numbered by position. Row order is preserved and
//! becomes the row order of every output table.

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use polars::prelude::{DataFrame, DataType, ParquetReader, SerReader};
use satfeat_core::{Point, PointStore};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PointRecord {
    id: Option<u64>,
    lon: f64,
    lat: f64,
}

/// Load points by file extension (`.csv` or `.parquet`).
pub fn load_points(path: &Path) -> Result<PointStore> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    let points = match extension.as_str() {
        "csv" => read_csv_points(path)?,
        "parquet" => read_parquet_points(path)?,
        other => {
            return Err(anyhow!(
                "unsupported points extension '{}' (use .csv or .parquet)",
                other
            ))
        }
    };
    PointStore::new(points).with_context(|| format!("validating points from {}", path.display()))
}

fn read_csv_points(path: &Path) -> Result<Vec<Point>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening points CSV '{}'", path.display()))?;
    let mut points = Vec::new();
    for (row, record) in reader.deserialize::<PointRecord>().enumerate() {
        let record =
            record.with_context(|| format!("parsing row {} of {}", row + 1, path.display()))?;
        points.push(Point::new(
            record.id.unwrap_or(row as u64),
            record.lon,
            record.lat,
        ));
    }
    Ok(points)
}

fn read_parquet_points(path: &Path) -> Result<Vec<Point>> {
    let file = File::open(path)
        .with_context(|| format!("opening points parquet '{}'", path.display()))?;
    let df = ParquetReader::new(file)
        .finish()
        .with_context(|| format!("reading points parquet '{}'", path.display()))?;
    points_from_frame(&df)
}

/// Points from a frame with float `lon`/`lat` and an optional integer `id`.
pub fn points_from_frame(df: &DataFrame) -> Result<Vec<Point>> {
    let lons = column_f64(df, "lon")?;
    let lats = column_f64(df, "lat")?;
    let ids: Vec<Option<u64>> = match df.column("id") {
        Ok(series) => series
            .cast(&DataType::UInt64)
            .context("column 'id' must be integer")?
            .u64()
            .context("column 'id' must be integer")?
            .into_iter()
            .collect(),
        Err(_) => vec![None; df.height()],
    };

    lons.into_iter()
        .zip(lats)
        .zip(ids)
        .enumerate()
        .map(|(row, ((lon, lat), id))| match (lon, lat) {
            (Some(lon), Some(lat)) => Ok(Point::new(id.unwrap_or(row as u64), lon, lat)),
            _ => Err(anyhow!("row {row} has a null coordinate")),
        })
        .collect()
}

fn column_f64(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let series = df
        .column(column)
        .with_context(|| format!("points table has no '{}' column", column))?
        .cast(&DataType::Float64)
        .with_context(|| format!("column '{}' must be numeric", column))?;
    let chunked = series
        .f64()
        .with_context(|| format!("column '{}' must be float", column))?;
    Ok(chunked.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{NamedFrom, ParquetWriter, Series};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn csv_without_ids_is_numbered_by_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("points.csv");
        fs::write(&path, "lon,lat\n36.80, -1.28\n37.00,-1.50\n").unwrap();
        let store = load_points(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).unwrap().id, 1);
        assert_eq!(store.get(0).unwrap().lon, 36.80);
    }

    #[test]
    fn csv_keeps_explicit_ids_and_column_order_is_free() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("points.csv");
        fs::write(&path, "lat,lon,id\n-1.0,36.0,900\n-1.1,36.1,17\n").unwrap();
        let store = load_points(&path).unwrap();
        let ids: Vec<u64> = store.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![900, 17]);
    }

    #[test]
    fn parquet_points_round_trip_through_polars() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("points.parquet");
        let mut df = DataFrame::new(vec![
            Series::new("lon", [10.0, 10.5, 11.0]),
            Series::new("lat", [45.0, 45.5, 46.0]),
            Series::new("id", [7i64, 8, 9]),
        ])
        .unwrap();
        let mut file = File::create(&path).unwrap();
        ParquetWriter::new(&mut file).finish(&mut df).unwrap();

        let store = load_points(&path).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(2).unwrap().id, 9);
        assert_eq!(store.lats(), vec![45.0, 45.5, 46.0]);
    }

    #[test]
    fn bad_inputs_are_rejected() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.csv");
        fs::write(&empty, "lon,lat\n").unwrap();
        assert!(load_points(&empty).is_err());

        let out_of_range = dir.path().join("bad.csv");
        fs::write(&out_of_range, "lon,lat\n200.0,0.0\n").unwrap();
        assert!(load_points(&out_of_range).is_err());

        assert!(load_points(&dir.path().join("points.json")).is_err());
    }
}
