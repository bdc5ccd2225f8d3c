use std::fmt;
use std::str::FromStr;

use jiff::civil::Date;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    static ref MONTH_TOKEN: Regex = Regex::new(r"^(\d{4})M(\d{2})$").unwrap();
}

#[derive(Error, Debug)]
#[error("{0}")]
pub struct ParseMonthError(pub String);

/// A calendar month, e.g. 2025-01.  The text form is the SCB token
/// "2025M01".  Ordering is chronological.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash)]
pub struct Month {
    year: i16,
    month: i8,
}

pub fn month(year: i16, month: i8) -> Month {
    Month::new(year, month)
}

impl Month {
    pub fn new(year: i16, month: i8) -> Month {
        assert!((1..=12).contains(&month), "month of year {} out of range", month);
        Month { year, month }
    }

    pub fn year(&self) -> i16 {
        self.year
    }

    pub fn month(&self) -> i8 {
        self.month
    }

    /// Return the month that contains this date.
    pub fn containing(date: Date) -> Month {
        Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The last fully elapsed month relative to `today`, i.e. the month
    /// before the one containing it.  The current month is still
    /// accumulating and is never a valid target.
    pub fn last_elapsed(today: Date) -> Month {
        Month::containing(today).previous()
    }

    pub fn next(&self) -> Month {
        self.add_months(1)
    }

    pub fn previous(&self) -> Month {
        self.add_months(-1)
    }

    /// Add a number of months, possibly negative, rolling the year as
    /// needed.
    pub fn add_months(&self, n: i32) -> Month {
        let total = self.year as i32 * 12 + (self.month as i32 - 1) + n;
        Month {
            year: total.div_euclid(12) as i16,
            month: (total.rem_euclid(12) + 1) as i8,
        }
    }

    /// All months from this one through `end`, inclusive, in ascending
    /// order.  Empty if `end` is before this month.
    pub fn up_to(&self, end: Month) -> Vec<Month> {
        let mut months = Vec::new();
        let mut current = *self;
        while current <= end {
            months.push(current);
            current = current.next();
        }
        months
    }
}

impl FromStr for Month {
    type Err = ParseMonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = MONTH_TOKEN
            .captures(s)
            .ok_or_else(|| ParseMonthError(format!("Failed parsing {} as a month", s)))?;
        let year = caps[1].parse::<i16>().unwrap();
        let month = caps[2].parse::<i8>().unwrap();
        if !(1..=12).contains(&month) {
            return Err(ParseMonthError(format!("Month of year {} out of range", month)));
        }
        Ok(Month { year, month })
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}M{:02}", self.year, self.month)
    }
}
