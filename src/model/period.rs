//! Calendar year-month windows used to scope loading and display.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A calendar year-month window, e.g. `2024-03`.
///
/// The engine materializes exactly one period at a time. Membership is tested
/// against the half-open UTC range `[start, end)` where `end` is the first
/// instant of the following month; [`Period::contains`] agrees with that range
/// exactly, so a record accepted locally always survives the next
/// authoritative reload and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: i32,
    month: u32,
}

/// An error that can occur when parsing strings into `Period` values.
#[derive(Debug, thiserror::Error)]
#[error("invalid period '{0}', expected YYYY-MM")]
pub struct PeriodError(String);

impl Period {
    /// Creates a period, rejecting out-of-range months.
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError(format!("{year}-{month}")));
        }
        Ok(Self { year, month })
    }

    /// The period containing `date`.
    pub fn from_date(date: DateTime<Utc>) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The period containing the present instant.
    pub fn current() -> Self {
        Self::from_date(Utc::now())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// True if `date` falls within this calendar month.
    pub fn contains(&self, date: &DateTime<Utc>) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// First instant of the month.
    pub fn start(&self) -> DateTime<Utc> {
        // The month is validated at construction so this cannot fail.
        let day = NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default();
        day.and_time(NaiveTime::MIN).and_utc()
    }

    /// First instant of the following month; the exclusive upper bound of the
    /// window.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    /// The following month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The preceding month.
    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PeriodError(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(err)?;
        let year = year.parse::<i32>().map_err(|_| err())?;
        let month = month.parse::<u32>().map_err(|_| err())?;
        Self::new(year, month).map_err(|_| err())
    }
}
