//! Date handling for the ten-day forecast window.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{ForecastError, ForecastResult};

/// Number of days covered by one forecast run.
pub const FORECAST_DAYS: u32 = 10;

/// Format used in resource paths.
const COMPACT_FORMAT: &str = "%Y%m%d";

/// Format a date as `YYYYMMDD`.
pub fn format_compact(date: NaiveDate) -> String {
    date.format(COMPACT_FORMAT).to_string()
}

/// Parse `YYYYMMDD` or ISO `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> ForecastResult<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, COMPACT_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| ForecastError::InvalidDate(s.to_string()))
}

/// The days available from one forecast run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastWindow {
    pub start: NaiveDate,
    pub days: u32,
}

impl ForecastWindow {
    pub fn new(start: NaiveDate) -> Self {
        Self {
            start,
            days: FORECAST_DAYS,
        }
    }

    /// Last day with data.
    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(self.days.saturating_sub(1) as i64)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end()
    }

    /// Every target date in the window, in order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..self.days)
            .map(|offset| self.start + Duration::days(offset as i64))
            .collect()
    }

    /// Reject a target date outside the run.
    pub fn check(&self, date: NaiveDate) -> ForecastResult<()> {
        if self.contains(date) {
            Ok(())
        } else {
            Err(ForecastError::InvalidDate(format!(
                "{} is outside the forecast window {}..={}",
                date,
                self.start,
                self.end()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_round_trip_formats() {
        let d = parse_date("20240305").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(parse_date("2024-03-05").unwrap(), d);
        assert_eq!(format_compact(d), "20240305");
        assert!(parse_date("March 5").is_err());
    }

    #[test]
    fn test_window_covers_ten_days() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 25).unwrap();
        let window = ForecastWindow::new(start);
        let dates = window.dates();
        assert_eq!(dates.len(), 10);
        assert_eq!(window.end(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert!(window.check(window.end()).is_ok());
        assert!(window.check(window.end().succ_opt().unwrap()).is_err());
        assert!(window.check(start.pred_opt().unwrap()).is_err());
    }
}
