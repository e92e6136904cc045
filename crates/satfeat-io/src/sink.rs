//! Parquet persistence of period tables.
//!
//! Columns are the feature indices `"0"`..`"F-1"` (f64), then `lon`, `lat`
//! (f64) and `year`, `month` (i32). A table is written under
//! `<output_dir>/.staging` and renamed into place, so a crash never leaves a
//! truncated file under the final name.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::{
    DataFrame, NamedFrom, ParquetCompression, ParquetReader, ParquetWriter, SerReader, Series,
};
use satfeat_core::{OutputName, PeriodFeatureTable, PeriodSink, SatfeatResult};
use tracing::info;

pub const STAGING_DIR: &str = ".staging";

pub struct ParquetSink {
    output_dir: PathBuf,
}

impl ParquetSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Final location of a named table.
    pub fn path_for(&self, name: &OutputName) -> PathBuf {
        self.output_dir.join(name.file_name("parquet"))
    }

    fn write(&self, table: &PeriodFeatureTable, name: &OutputName) -> Result<PathBuf> {
        let staging = self.output_dir.join(STAGING_DIR);
        fs::create_dir_all(&staging)
            .with_context(|| format!("creating staging directory {}", staging.display()))?;

        let file_name = name.file_name("parquet");
        let staged = staging.join(&file_name);
        let mut df = table_frame(table)?;
        persist_dataframe(&staged, &mut df)?;

        let dest = self.output_dir.join(&file_name);
        fs::rename(&staged, &dest).with_context(|| {
            format!("moving {} into {}", staged.display(), dest.display())
        })?;
        info!(
            rows = table.num_rows(),
            features = table.num_features(),
            "wrote {}",
            dest.display()
        );
        Ok(dest)
    }
}

impl PeriodSink for ParquetSink {
    fn persist(&mut self, table: &PeriodFeatureTable, name: &OutputName) -> SatfeatResult<PathBuf> {
        Ok(self.write(table, name)?)
    }
}

/// Columnar frame of a period table, in output column order.
pub fn table_frame(table: &PeriodFeatureTable) -> Result<DataFrame> {
    let rows = table.num_rows();
    let mut columns = Vec::with_capacity(table.num_features() + 4);
    for f in 0..table.num_features() {
        columns.push(Series::new(&f.to_string(), table.features.column(f)));
    }
    columns.push(Series::new("lon", table.lon.clone()));
    columns.push(Series::new("lat", table.lat.clone()));
    columns.push(Series::new("year", vec![table.period.year; rows]));
    columns.push(Series::new("month", vec![table.period.month as i32; rows]));
    DataFrame::new(columns).context("assembling period frame")
}

fn persist_dataframe(path: &Path, df: &mut DataFrame) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("creating Parquet output '{}'", path.display()))?;
    ParquetWriter::new(&mut file)
        .with_compression(ParquetCompression::Snappy)
        .finish(df)
        .with_context(|| format!("writing Parquet {}", path.display()))?;
    Ok(())
}

/// Read a written period table back.
pub fn read_period_table(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("opening period table '{}'", path.display()))?;
    ParquetReader::new(file)
        .finish()
        .with_context(|| format!("reading period table '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use satfeat_core::{FeatureMatrix, Period, PointStore};
    use tempfile::tempdir;

    fn table() -> (PeriodFeatureTable, OutputName) {
        let store = PointStore::from_coords(&[(36.8, -1.3), (36.9, -1.2)]).unwrap();
        let mut features = FeatureMatrix::zeros(2, 4);
        features.set_row(1, &[0.5, 0.0, 1.5, 2.0]).unwrap();
        let period = Period::new(2019, 3).unwrap();
        let table = PeriodFeatureTable::assemble(period, features, &store).unwrap();
        let bands = vec!["B04".to_string(), "B08".to_string()];
        let name = OutputName::new("s2", &bands, "KEN", store.len(), 4, period);
        (table, name)
    }

    #[test]
    fn persisted_table_has_expected_schema_and_rows() {
        let dir = tempdir().unwrap();
        let (table, name) = table();
        let mut sink = ParquetSink::new(dir.path());
        let path = sink.persist(&table, &name).unwrap();
        assert_eq!(path, dir.path().join("s2_4-8_KEN_0k-points_4-features_2019_03.parquet"));

        let df = read_period_table(&path).unwrap();
        let names: Vec<&str> = df.get_column_names();
        assert_eq!(names, vec!["0", "1", "2", "3", "lon", "lat", "year", "month"]);
        assert_eq!(df.height(), 2);
        let third: Vec<Option<f64>> = df.column("2").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(third, vec![Some(0.0), Some(1.5)]);
        let months: Vec<Option<i32>> =
            df.column("month").unwrap().i32().unwrap().into_iter().collect();
        assert_eq!(months, vec![Some(3), Some(3)]);
    }

    #[test]
    fn staging_directory_is_left_empty() {
        let dir = tempdir().unwrap();
        let (table, name) = table();
        let mut sink = ParquetSink::new(dir.path().join("out"));
        sink.persist(&table, &name).unwrap();
        let staged: Vec<_> = fs::read_dir(dir.path().join("out").join(STAGING_DIR))
            .unwrap()
            .collect();
        assert!(staged.is_empty());
    }

    #[test]
    fn rewriting_a_period_is_byte_identical() {
        let dir = tempdir().unwrap();
        let (table, name) = table();
        let mut sink = ParquetSink::new(dir.path());
        let path = sink.persist(&table, &name).unwrap();
        let first = fs::read(&path).unwrap();
        sink.persist(&table, &name).unwrap();
        assert_eq!(first, fs::read(&path).unwrap());
    }
}
