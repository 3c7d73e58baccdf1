use anyhow::{Result, anyhow};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sampling interval of a historical series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Interval {
    /// Key of the period a date falls into. Two dates share a bar
    /// of this interval iff their period keys are equal.
    pub fn period_key(&self, date: NaiveDate) -> (i32, u32) {
        match self {
            Interval::Daily => (date.year(), date.ordinal()),
            Interval::Weekly => {
                let week = date.iso_week();
                (week.year(), week.week())
            }
            Interval::Monthly => (date.year(), date.month()),
            Interval::Yearly => (date.year(), 0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
            Interval::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "daily" | "1d" | "day" => Ok(Interval::Daily),
            "weekly" | "1w" | "week" => Ok(Interval::Weekly),
            "monthly" | "1mo" | "month" => Ok(Interval::Monthly),
            "yearly" | "1y" | "year" => Ok(Interval::Yearly),
            _ => Err(anyhow!(
                "Invalid interval: {}. Must be 'daily', 'weekly', 'monthly' or 'yearly'",
                s
            )),
        }
    }
}

/// Inclusive calendar range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(anyhow!("Invalid date range: {} is after {}", start, end));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_parsing() {
        assert_eq!(Interval::from_str("daily").unwrap(), Interval::Daily);
        assert_eq!(Interval::from_str("WEEKLY").unwrap(), Interval::Weekly);
        assert_eq!(Interval::from_str("1mo").unwrap(), Interval::Monthly);
        assert!(Interval::from_str("hourly").is_err());
    }

    #[test]
    fn test_weekly_period_key_groups_iso_week() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let friday = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let next_monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();

        assert_eq!(
            Interval::Weekly.period_key(monday),
            Interval::Weekly.period_key(friday)
        );
        assert_ne!(
            Interval::Weekly.period_key(friday),
            Interval::Weekly.period_key(next_monday)
        );
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        let a = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(DateRange::new(a, b).is_err());

        let range = DateRange::new(b, a).unwrap();
        assert!(range.contains(a));
        assert!(range.contains(b));
    }
}
