use serde::{Deserialize, Serialize};

use crate::error::{SatfeatError, SatfeatResult};
use crate::period::Period;
use crate::point::PointStore;

/// Stacked, normalised pixels around one point, band-major
/// (`data[(band * height + row) * width + col]`).
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub bands: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl Patch {
    pub fn new(bands: usize, height: usize, width: usize, data: Vec<f32>) -> SatfeatResult<Self> {
        if data.len() != bands * height * width {
            return Err(SatfeatError::Raster(format!(
                "patch buffer has {} values, expected {}x{}x{}",
                data.len(),
                bands,
                height,
                width
            )));
        }
        Ok(Self {
            bands,
            height,
            width,
            data,
        })
    }

    #[inline]
    pub fn get(&self, band: usize, row: usize, col: usize) -> f32 {
        self.data[(band * self.height + row) * self.width + col]
    }

    pub fn band(&self, band: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.data[band * plane..(band + 1) * plane]
    }
}

/// Result of extracting one point. Every variant except `Valid` maps to the
/// all-zero feature row.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    Valid(Patch),
    /// No scene covered the point this period.
    Unmatched,
    /// The clipped window was smaller than the minimum edge.
    Undersized { height: usize, width: usize },
    /// No contrast to normalise (constant or all nodata).
    Constant,
    /// Read or decode failure.
    Failed(String),
}

impl PatchOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, PatchOutcome::Valid(_))
    }

    pub fn patch(&self) -> Option<&Patch> {
        match self {
            PatchOutcome::Valid(patch) => Some(patch),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PatchOutcome::Valid(_) => "valid",
            PatchOutcome::Unmatched => "unmatched",
            PatchOutcome::Undersized { .. } => "undersized",
            PatchOutcome::Constant => "constant",
            PatchOutcome::Failed(_) => "failed",
        }
    }
}

pub type FeatureVector = Vec<f64>;

/// Pre-sized `rows x cols` matrix, zero-initialised so rows that are never
/// written read as the "no data" sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    pub fn set_row(&mut self, index: usize, values: &[f64]) -> SatfeatResult<()> {
        if index >= self.rows {
            return Err(SatfeatError::Compute(format!(
                "row {index} out of range for {} rows",
                self.rows
            )));
        }
        if values.len() != self.cols {
            return Err(SatfeatError::Compute(format!(
                "feature row has {} values, expected {}",
                values.len(),
                self.cols
            )));
        }
        self.data[index * self.cols..(index + 1) * self.cols].copy_from_slice(values);
        Ok(())
    }

    pub fn column(&self, index: usize) -> Vec<f64> {
        self.data
            .iter()
            .skip(index)
            .step_by(self.cols.max(1))
            .copied()
            .collect()
    }

    pub fn is_zero_row(&self, index: usize) -> bool {
        self.row(index).iter().all(|v| *v == 0.0)
    }
}

/// One period's output: a feature row per input point, in store order.
#[derive(Debug, Clone)]
pub struct PeriodFeatureTable {
    pub period: Period,
    pub features: FeatureMatrix,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
}

impl PeriodFeatureTable {
    pub fn assemble(period: Period, features: FeatureMatrix, store: &PointStore) -> SatfeatResult<Self> {
        if features.rows() != store.len() {
            return Err(SatfeatError::Compute(format!(
                "feature matrix has {} rows for {} points",
                features.rows(),
                store.len()
            )));
        }
        Ok(Self {
            period,
            features,
            lon: store.lons(),
            lat: store.lats(),
        })
    }

    pub fn num_rows(&self) -> usize {
        self.features.rows()
    }

    pub fn num_features(&self) -> usize {
        self.features.cols()
    }

    pub fn zero_rows(&self) -> usize {
        (0..self.num_rows())
            .filter(|&i| self.features.is_zero_row(i))
            .count()
    }
}

/// Per-period tallies of how points were resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub valid: usize,
    pub unmatched: usize,
    pub undersized: usize,
    pub constant: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: &PatchOutcome) {
        match outcome {
            PatchOutcome::Valid(_) => self.valid += 1,
            PatchOutcome::Unmatched => self.unmatched += 1,
            PatchOutcome::Undersized { .. } => self.undersized += 1,
            PatchOutcome::Constant => self.constant += 1,
            PatchOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.valid + self.unmatched + self.undersized + self.constant + self.failed
    }
}
