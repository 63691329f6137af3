//! Period granularity and calendar bucketing.
//!
//! This module defines [`PeriodType`], the granularity a sales series is
//! aggregated at, together with the calendar rules that map a date onto the
//! start of its period.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ForecastError;

/// Granularity of an aggregated sales series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// One calendar day.
    Daily,
    /// One ISO week, starting Monday.
    #[default]
    Weekly,
    /// One calendar month.
    Monthly,
}

impl PeriodType {
    /// All period types, finest first.
    pub const ALL: [Self; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

    /// Returns the lowercase storage tag for this period.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Returns the first date of the period containing `date`.
    #[must_use]
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => date,
            Self::Weekly => date - Days::new(u64::from(date.weekday().num_days_from_monday())),
            // Day 1 always exists
            Self::Monthly => date.with_day(1).unwrap_or(date),
        }
    }

    /// Returns the start of the period `steps` periods after `start`.
    ///
    /// Returns `None` if the result falls outside chrono's supported range.
    #[must_use]
    pub fn advance(&self, start: NaiveDate, steps: u32) -> Option<NaiveDate> {
        match self {
            Self::Daily => start.checked_add_days(Days::new(u64::from(steps))),
            Self::Weekly => start.checked_add_days(Days::new(7 * u64::from(steps))),
            Self::Monthly => start.checked_add_months(Months::new(steps)),
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(ForecastError::Parse(format!(
                "period_type must be 'daily', 'weekly', or 'monthly', got '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekly_start_is_monday() {
        // 2024-01-07 is a Sunday, belongs to the week starting Monday 2024-01-01
        assert_eq!(PeriodType::Weekly.period_start(date(2024, 1, 7)), date(2024, 1, 1));
        assert_eq!(PeriodType::Weekly.period_start(date(2024, 1, 8)), date(2024, 1, 8));
        // ISO week crossing a year boundary
        assert_eq!(PeriodType::Weekly.period_start(date(2025, 1, 1)), date(2024, 12, 30));
    }

    #[test]
    fn test_monthly_and_daily_start() {
        assert_eq!(PeriodType::Monthly.period_start(date(2024, 2, 29)), date(2024, 2, 1));
        assert_eq!(PeriodType::Daily.period_start(date(2024, 2, 29)), date(2024, 2, 29));
    }

    #[test]
    fn test_advance() {
        assert_eq!(PeriodType::Weekly.advance(date(2024, 1, 1), 2), Some(date(2024, 1, 15)));
        assert_eq!(PeriodType::Monthly.advance(date(2024, 11, 1), 3), Some(date(2025, 2, 1)));
        assert_eq!(PeriodType::Daily.advance(date(2024, 2, 28), 1), Some(date(2024, 2, 29)));
    }

    #[test]
    fn test_parse_round_trip() {
        for period in PeriodType::ALL {
            assert_eq!(period.as_str().parse::<PeriodType>().unwrap(), period);
        }
        assert!("hourly".parse::<PeriodType>().is_err());
    }
}
