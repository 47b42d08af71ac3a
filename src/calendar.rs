// 📅 Period Calendar
// Total ordering and distance arithmetic over (year, month) pairs.
//
// Day-of-month is not modeled: every observation is the first day of its month.
// Linear index = year * 12 + month, so "3 months before" is plain integer subtraction.

use crate::error::{PpiError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// LINEAR INDEX
// ============================================================================

/// Map (year, month) onto a linear month index: `year * 12 + month`
pub fn to_linear_index(year: i32, month: u32) -> Result<i64> {
    validate_month(month)?;
    Ok(year as i64 * 12 + month as i64)
}

/// Signed distance in months: `index(a) - index(b)`
pub fn months_between(a: (i32, u32), b: (i32, u32)) -> Result<i64> {
    Ok(to_linear_index(a.0, a.1)? - to_linear_index(b.0, b.1)?)
}

fn validate_month(month: u32) -> Result<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(PpiError::InvalidPeriod(format!(
            "month must be in 1..=12, got {}",
            month
        )))
    }
}

// ============================================================================
// PERIOD CODE (BLS "M01".."M12")
// ============================================================================

/// BLS monthly period code
///
/// "M13" is the BLS annual average and is rejected like any other invalid code;
/// it has no place in a monthly series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period(u32);

impl Period {
    pub fn new(month: u32) -> Result<Self> {
        validate_month(month)?;
        Ok(Period(month))
    }

    pub fn month(&self) -> u32 {
        self.0
    }

    pub fn code(&self) -> String {
        format!("M{:02}", self.0)
    }
}

impl FromStr for Period {
    type Err = PpiError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim();
        let digits = code
            .strip_prefix('M')
            .or_else(|| code.strip_prefix('m'))
            .ok_or_else(|| PpiError::InvalidPeriod(format!("expected M01..M12, got '{}'", code)))?;

        if digits.len() != 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PpiError::InvalidPeriod(format!(
                "expected M01..M12, got '{}'",
                code
            )));
        }

        let month: u32 = digits
            .parse()
            .map_err(|_| PpiError::InvalidPeriod(format!("expected M01..M12, got '{}'", code)))?;

        Period::new(month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{:02}", self.0)
    }
}

impl TryFrom<String> for Period {
    type Error = PpiError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.code()
    }
}

// ============================================================================
// YEAR-MONTH
// ============================================================================

/// Validated calendar month. Field order gives the (year, month) ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        validate_month(month)?;

        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(PpiError::InvalidPeriod(format!("year {} out of range", year)));
        }

        Ok(YearMonth { year, month })
    }

    pub fn from_period(year: i32, period: Period) -> Result<Self> {
        YearMonth::new(year, period.month())
    }

    pub fn linear_index(&self) -> i64 {
        self.year as i64 * 12 + self.month as i64
    }

    /// Inverse of `linear_index`
    pub fn from_linear_index(index: i64) -> Result<Self> {
        let zero_based = index - 1;
        let year = i32::try_from(zero_based.div_euclid(12))
            .map_err(|_| PpiError::InvalidPeriod(format!("month index {} out of range", index)))?;
        YearMonth::new(year, zero_based.rem_euclid(12) as u32 + 1)
    }

    /// Shift by `months` (negative goes back in time)
    pub fn add_months(&self, months: i64) -> Result<Self> {
        YearMonth::from_linear_index(self.linear_index() + months)
    }

    /// Months from `other` to `self` (positive when self is later)
    pub fn months_since(&self, other: &YearMonth) -> i64 {
        self.linear_index() - other.linear_index()
    }

    /// First day of the month
    pub fn first_day(&self) -> NaiveDate {
        // new() already proved this date exists
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn from_date(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl FromStr for YearMonth {
    type Err = PpiError;

    /// Accepts "YYYY-MM" and "YYYY-M"
    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| PpiError::InvalidPeriod(format!("expected YYYY-MM, got '{}'", s)))?;

        let year: i32 = year
            .parse()
            .map_err(|_| PpiError::InvalidPeriod(format!("bad year in '{}'", s)))?;
        let month: u32 = month
            .parse()
            .map_err(|_| PpiError::InvalidPeriod(format!("bad month in '{}'", s)))?;

        YearMonth::new(year, month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_index() {
        assert_eq!(to_linear_index(2020, 1).unwrap(), 2020 * 12 + 1);
        assert_eq!(to_linear_index(2020, 12).unwrap() + 1, to_linear_index(2021, 1).unwrap());
    }

    #[test]
    fn test_linear_index_rejects_bad_month() {
        assert!(matches!(to_linear_index(2020, 0), Err(PpiError::InvalidPeriod(_))));
        assert!(matches!(to_linear_index(2020, 13), Err(PpiError::InvalidPeriod(_))));
    }

    #[test]
    fn test_months_between() {
        assert_eq!(months_between((2021, 3), (2020, 12)).unwrap(), 3);
        assert_eq!(months_between((2020, 12), (2021, 3)).unwrap(), -3);
        assert_eq!(months_between((2020, 6), (2020, 6)).unwrap(), 0);
        assert!(months_between((2020, 6), (2020, 14)).is_err());
    }

    #[test]
    fn test_period_parse() {
        assert_eq!("M01".parse::<Period>().unwrap().month(), 1);
        assert_eq!(" M12 ".parse::<Period>().unwrap().month(), 12);
        assert_eq!(Period::new(7).unwrap().to_string(), "M07");

        // Annual average and garbage are both rejected
        assert!("M13".parse::<Period>().is_err());
        assert!("M00".parse::<Period>().is_err());
        assert!("Q01".parse::<Period>().is_err());
        assert!("M1".parse::<Period>().is_err());
        assert!("".parse::<Period>().is_err());
    }

    #[test]
    fn test_year_month_ordering() {
        let a = YearMonth::new(2019, 12).unwrap();
        let b = YearMonth::new(2020, 1).unwrap();
        assert!(a < b);
        assert_eq!(b.months_since(&a), 1);
        assert_eq!(a.first_day(), NaiveDate::from_ymd_opt(2019, 12, 1).unwrap());
    }

    #[test]
    fn test_add_months_crosses_years() {
        let ym = YearMonth::new(2020, 11).unwrap();
        assert_eq!(ym.add_months(2).unwrap(), YearMonth::new(2021, 1).unwrap());
        assert_eq!(ym.add_months(-11).unwrap(), YearMonth::new(2019, 12).unwrap());
        assert_eq!(ym.add_months(0).unwrap(), ym);

        let index = to_linear_index(2020, 12).unwrap();
        assert_eq!(YearMonth::from_linear_index(index).unwrap(), YearMonth::new(2020, 12).unwrap());
    }

    #[test]
    fn test_year_month_parse_and_display() {
        let ym: YearMonth = "2015-01".parse().unwrap();
        assert_eq!(ym, YearMonth::new(2015, 1).unwrap());
        assert_eq!(ym.to_string(), "2015-01");

        assert_eq!("2015-3".parse::<YearMonth>().unwrap().month, 3);
        assert!("2015-13".parse::<YearMonth>().is_err());
        assert!("201501".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_year_month_round_trips_date() {
        let date = NaiveDate::from_ymd_opt(2023, 5, 17).unwrap();
        let ym = YearMonth::from_date(date);
        assert_eq!(ym, YearMonth::new(2023, 5).unwrap());
        assert_eq!(ym.first_day(), NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());
    }
}
