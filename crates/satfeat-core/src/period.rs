use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{SatfeatError, SatfeatResult};

/// One calendar month; the unit of iteration and of output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> SatfeatResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(SatfeatError::Config(format!(
                "month {month} is outside 1..=12"
            )));
        }
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(SatfeatError::Config(format!("year {year} is out of range")));
        }
        Ok(Self { year, month })
    }

    pub fn first_day(&self) -> NaiveDate {
        // Constructors guarantee a representable first day.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .map(|next| next.first_day())
            .and_then(|day| day.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// Inclusive day range in the catalog's `start/end` form.
    pub fn datetime_range(&self) -> String {
        format!(
            "{}/{}",
            self.first_day().format("%Y-%m-%d"),
            self.last_day().format("%Y-%m-%d")
        )
    }

    pub fn next(&self) -> Option<Period> {
        if self.month == 12 {
            Period::new(self.year + 1, 1).ok()
        } else {
            Some(Period {
                year: self.year,
                month: self.month + 1,
            })
        }
    }

    /// Every month from `start` to `end`, both inclusive, in order.
    pub fn range(start: Period, end: Period) -> SatfeatResult<Vec<Period>> {
        if end < start {
            return Err(SatfeatError::Config(format!(
                "period range ends ({end}) before it starts ({start})"
            )));
        }
        let mut periods = Vec::new();
        let mut current = Some(start);
        while let Some(period) = current {
            if period > end {
                break;
            }
            periods.push(period);
            current = period.next();
        }
        Ok(periods)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl From<NaiveDate> for Period {
    fn from(date: NaiveDate) -> Self {
        Period {
            year: date.year(),
            month: date.month(),
        }
    }
}
