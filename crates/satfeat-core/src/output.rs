use std::path::PathBuf;

use crate::error::SatfeatResult;
use crate::features::PeriodFeatureTable;
use crate::period::Period;

/// Deterministic name of one period's output table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputName {
    pub satellite: String,
    pub band_code: String,
    pub region: String,
    pub num_points: usize,
    pub num_features: usize,
    pub period: Period,
}

impl OutputName {
    pub fn new(
        satellite: &str,
        bands: &[String],
        region: &str,
        num_points: usize,
        num_features: usize,
        period: Period,
    ) -> Self {
        Self {
            satellite: satellite.to_string(),
            band_code: band_short_code(bands),
            region: region.to_string(),
            num_points,
            num_features,
            period,
        }
    }

    /// Point count in thousands, rounded half away from zero.
    pub fn points_k(&self) -> u64 {
        (self.num_points as f64 / 1000.0).round() as u64
    }

    pub fn stem(&self) -> String {
        format!(
            "{}_{}_{}_{}k-points_{}-features_{}_{:02}",
            self.satellite,
            self.band_code,
            self.region,
            self.points_k(),
            self.num_features,
            self.period.year,
            self.period.month
        )
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.stem(), extension)
    }
}

/// Short code for a band list: `["B02", "B03", "B8A"]` becomes `2-3-8A`.
///
/// The alphabetic/underscore prefix and leading zeros of each identifier
/// are dropped; identifiers without digits are kept whole.
pub fn band_short_code(bands: &[String]) -> String {
    bands
        .iter()
        .map(|band| {
            let start = band.find(|c: char| c.is_ascii_digit());
            match start {
                Some(idx) => {
                    let tail = band[idx..].trim_start_matches('0');
                    if tail.is_empty() || !tail.starts_with(|c: char| c.is_ascii_digit()) {
                        format!("0{tail}")
                    } else {
                        tail.to_string()
                    }
                }
                None => band.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Destination for finished period tables.
pub trait PeriodSink {
    fn persist(&mut self, table: &PeriodFeatureTable, name: &OutputName) -> SatfeatResult<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn band_codes_strip_prefixes() {
        assert_eq!(band_short_code(&bands(&["B02", "B03", "B04", "B08"])), "2-3-4-8");
        assert_eq!(band_short_code(&bands(&["SR_B2", "B8A", "B10"])), "2-8A-10");
        assert_eq!(band_short_code(&bands(&["red", "B00"])), "red-0");
    }

    #[test]
    fn output_name_is_deterministic() {
        let period = Period::new(2019, 3).unwrap();
        let name = OutputName::new("s2", &bands(&["B02", "B03"]), "KEN", 25_400, 1000, period);
        assert_eq!(
            name.file_name("parquet"),
            "s2_2-3_KEN_25k-points_1000-features_2019_03.parquet"
        );
        assert_eq!(name, OutputName::new("s2", &bands(&["B02", "B03"]), "KEN", 25_400, 1000, period));
    }
}
