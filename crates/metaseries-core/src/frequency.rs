//! Period model: frequency parsing, period labels and inference.
//!
//! A [`Frequency`] defines a regular date grid. Observations are bucketed by
//! their period label (the last calendar date of the period containing them);
//! grids are generated by stepping labels with [`Frequency::advance`].

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SeriesError;

/// Frequency of a regular time-series grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    /// One observation per calendar day.
    Daily,
    /// One observation per week, labeled on Sunday.
    Weekly,
    /// One observation per month, labeled on the last day of the month.
    Monthly,
    /// One observation per quarter, labeled on the last day of the quarter.
    Quarterly,
    /// One observation per year, labeled on December 31.
    Annual,
}

impl Frequency {
    /// The period label for `date`: the last calendar date of the period
    /// containing it.
    #[must_use]
    pub fn period_end(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => date,
            Self::Weekly => {
                let to_sunday = 6 - u64::from(date.weekday().num_days_from_monday());
                date.checked_add_days(Days::new(to_sunday)).unwrap_or(date)
            }
            Self::Monthly => month_end(date.year(), date.month()),
            Self::Quarterly => {
                let quarter_month = ((date.month() - 1) / 3) * 3 + 3;
                month_end(date.year(), quarter_month)
            }
            Self::Annual => month_end(date.year(), 12),
        }
    }

    /// The next period label after `label`.
    ///
    /// `label` must itself be a period label; feeding an arbitrary date in
    /// returns the label of the following period.
    #[must_use]
    pub fn advance(&self, label: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => label.checked_add_days(Days::new(1)).unwrap_or(label),
            Self::Weekly => label.checked_add_days(Days::new(7)).unwrap_or(label),
            Self::Monthly | Self::Quarterly | Self::Annual => {
                let next = label.checked_add_days(Days::new(1)).unwrap_or(label);
                self.period_end(next)
            }
        }
    }

    /// Infers the frequency of a sorted date sequence from the gaps between
    /// consecutive dates. Every gap must classify to the same frequency;
    /// irregular series and series with fewer than two observations return
    /// `None`.
    #[must_use]
    pub fn infer(dates: &[NaiveDate]) -> Option<Self> {
        if dates.len() < 2 {
            return None;
        }
        let mut inferred: Option<Self> = None;
        for pair in dates.windows(2) {
            let gap = (pair[1] - pair[0]).num_days();
            let class = match gap {
                1 => Self::Daily,
                5..=7 => Self::Weekly,
                28..=31 => Self::Monthly,
                89..=92 => Self::Quarterly,
                360..=370 => Self::Annual,
                _ => return None,
            };
            match inferred {
                None => inferred = Some(class),
                Some(f) if f == class => {}
                Some(_) => return None,
            }
        }
        inferred
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Frequency {
    type Err = SeriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "d" | "day" | "daily" => Ok(Self::Daily),
            "w" | "week" | "weekly" => Ok(Self::Weekly),
            "m" | "me" | "month" | "monthly" => Ok(Self::Monthly),
            "q" | "qe" | "quarter" | "quarterly" => Ok(Self::Quarterly),
            "a" | "y" | "ye" | "year" | "annual" | "yearly" => Ok(Self::Annual),
            _ => Err(SeriesError::InvalidFrequency(s.to_string())),
        }
    }
}

/// Last day of the given month.
fn month_end(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .unwrap_or(NaiveDate::MAX)
}
