use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use satfeat_algo::{partition_points, Partition};
use satfeat_core::PointStore;
use satfeat_io::load_points;
use serde::Serialize;
use tabwriter::TabWriter;

use super::load_config;
use crate::cli::OutputFormat;

pub fn validate(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = load_points(&config.points)?;
    let periods = config.periods()?;
    println!(
        "Config OK: {} points, {} period(s), {} band(s), {} features",
        store.len(),
        periods.len(),
        config.bands.len(),
        config.num_features
    );
    Ok(())
}

#[derive(Serialize)]
struct PeriodRow {
    period: String,
    datetime: String,
    output: String,
}

pub fn periods(config_path: &Path, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let store = load_points(&config.points)?;
    let rows: Vec<PeriodRow> = config
        .periods()?
        .into_iter()
        .map(|period| PeriodRow {
            period: period.to_string(),
            datetime: period.datetime_range(),
            output: config
                .output_name(store.len(), period)
                .file_name("parquet"),
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut writer = TabWriter::new(io::stdout());
            writeln!(writer, "PERIOD\tDATETIME\tOUTPUT")?;
            for row in &rows {
                writeln!(writer, "{}\t{}\t{}", row.period, row.datetime, row.output)?;
            }
            writer.flush()?;
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct PartitionRow {
    id: usize,
    points: usize,
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl PartitionRow {
    fn new(partition: &Partition, store: &PointStore) -> Self {
        let mut row = PartitionRow {
            id: partition.id,
            points: partition.len(),
            min_lon: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for point in partition.indices.iter().filter_map(|&i| store.get(i)) {
            row.min_lon = row.min_lon.min(point.lon);
            row.min_lat = row.min_lat.min(point.lat);
            row.max_lon = row.max_lon.max(point.lon);
            row.max_lat = row.max_lat.max(point.lat);
        }
        row
    }
}

pub fn partition(config_path: &Path, partitions: Option<usize>, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let store = load_points(&config.points)?;
    let count = partitions.unwrap_or_else(|| config.partition_count(store.len()));
    let parts = partition_points(&store, count)
        .with_context(|| format!("partitioning {} points", store.len()))?;
    let rows: Vec<PartitionRow> = parts.iter().map(|p| PartitionRow::new(p, &store)).collect();

    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut writer = TabWriter::new(io::stdout());
            writeln!(writer, "PARTITION\tPOINTS\tMIN LON\tMIN LAT\tMAX LON\tMAX LAT")?;
            for row in &rows {
                writeln!(
                    writer,
                    "{}\t{}\t{:.4}\t{:.4}\t{:.4}\t{:.4}",
                    row.id, row.points, row.min_lon, row.min_lat, row.max_lon, row.max_lat
                )?;
            }
            writer.flush()?;
            let sizes = rows.iter().map(|r| r.points);
            println!(
                "{} points in {} partition(s), sizes {}..={}",
                store.len(),
                rows.len(),
                sizes.clone().min().unwrap_or(0),
                sizes.max().unwrap_or(0)
            );
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(rows: &[T]) -> Result<()> {
    serde_json::to_writer_pretty(io::stdout(), rows)
        .map_err(|err| anyhow::anyhow!("serializing listing to JSON: {err}"))?;
    println!();
    Ok(())
}
