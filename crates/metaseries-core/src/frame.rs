//! Shared DataFrame helpers.
//!
//! All tabular data in this workspace is a polars [`DataFrame`] with a `date`
//! column of dtype `Date` plus one or more value columns. This module holds
//! the normalization and accessor helpers the cache, the sources and the
//! client share.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

use crate::error::{Result, SeriesError};

/// Days between 0001-01-01 (chrono's CE epoch) and 1970-01-01 (polars' date
/// epoch).
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Column names recognized as the date column during normalization.
const DATE_COLUMN_ALIASES: &[&str] = &["date", "datetime", "time", "index"];

/// Converts a date to polars' physical representation (days since epoch).
#[must_use]
pub fn days_from_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Converts polars' physical date representation back to a date.
#[must_use]
pub fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
}

/// A literal expression for a date, usable in comparisons against a `Date`
/// column.
#[must_use]
pub fn date_expr(date: NaiveDate) -> Expr {
    lit(days_from_epoch(date)).cast(DataType::Date)
}

/// Normalizes a frame to the workspace convention: a `date` column of dtype
/// `Date`, rows sorted ascending by date.
///
/// The date column is located by name (`date`, `datetime`, `time`, `index`,
/// case-insensitive) or, failing that, by dtype. String and Datetime columns
/// are cast to `Date`.
///
/// # Errors
/// Returns [`SeriesError::Frame`] when no usable date column exists.
pub fn normalize_frame(df: &DataFrame) -> Result<DataFrame> {
    let mut df = df.clone();
    let date_col = find_date_column(&df)?;
    if date_col != "date" {
        df.rename(&date_col, "date".into())
            .map_err(|e| SeriesError::Frame(e.to_string()))?;
    }

    let out = df
        .lazy()
        .with_column(col("date").cast(DataType::Date))
        .sort(["date"], Default::default())
        .collect()
        .map_err(|e| SeriesError::Frame(e.to_string()))?;
    Ok(out)
}

/// Locates the date column by name, then by dtype.
fn find_date_column(df: &DataFrame) -> Result<String> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    for alias in DATE_COLUMN_ALIASES {
        if let Some(name) = names.iter().find(|n| n.to_lowercase() == *alias) {
            return Ok(name.clone());
        }
    }

    for name in &names {
        if let Ok(column) = df.column(name) {
            if matches!(column.dtype(), DataType::Date | DataType::Datetime(_, _)) {
                return Ok(name.clone());
            }
        }
    }

    Err(SeriesError::Frame(format!(
        "no date column found among: {}",
        names.join(", ")
    )))
}

/// Filters a normalized frame to the inclusive `[start, end]` date range.
pub fn filter_range(df: &DataFrame, start: NaiveDate, end: NaiveDate) -> Result<DataFrame> {
    df.clone()
        .lazy()
        .filter(
            col("date")
                .gt_eq(date_expr(start))
                .and(col("date").lt_eq(date_expr(end))),
        )
        .collect()
        .map_err(|e| SeriesError::Frame(e.to_string()))
}

/// Projects a frame down to `[date, name]`.
pub fn single_column(df: &DataFrame, name: &str) -> Result<DataFrame> {
    df.select(["date", name])
        .map_err(|e| SeriesError::Frame(e.to_string()))
}

/// Names of the value columns (everything except `date`), in frame order.
#[must_use]
pub fn value_column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|s| s.to_string())
        .filter(|n| n != "date")
        .collect()
}

/// Extracts the `date` column as a vector of dates.
///
/// # Errors
/// Returns [`SeriesError::Frame`] when the column is missing, has the wrong
/// dtype, or contains nulls.
pub fn column_dates(df: &DataFrame) -> Result<Vec<NaiveDate>> {
    let column = df
        .column("date")
        .map_err(|e| SeriesError::Frame(e.to_string()))?;
    let dates = column
        .date()
        .map_err(|e| SeriesError::Frame(e.to_string()))?;
    let physical = dates.0.clone();

    let mut out = Vec::with_capacity(physical.len());
    for i in 0..physical.len() {
        let days = physical
            .get(i)
            .ok_or_else(|| SeriesError::Frame("null value in date column".to_string()))?;
        let date = date_from_days(days)
            .ok_or_else(|| SeriesError::Frame(format!("date out of range: {days}")))?;
        out.push(date);
    }
    Ok(out)
}

/// Extracts a value column as `f64`, preserving nulls.
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|e| SeriesError::Frame(e.to_string()))?
        .cast(&DataType::Float64)
        .map_err(|e| SeriesError::Frame(e.to_string()))?;
    let values = column
        .f64()
        .map_err(|e| SeriesError::Frame(e.to_string()))?;
    Ok((0..values.len()).map(|i| values.get(i)).collect())
}

/// Builds a normalized `[date, name]` frame from parallel vectors.
pub fn frame_from_series(
    name: &str,
    dates: &[NaiveDate],
    values: &[Option<f64>],
) -> Result<DataFrame> {
    wide_frame(dates, vec![(name.to_string(), values.to_vec())])
}

/// Builds a normalized wide frame: `date` plus one column per `(name,
/// values)` pair. Every value vector must have the same length as `dates`.
pub fn wide_frame(
    dates: &[NaiveDate],
    columns: Vec<(String, Vec<Option<f64>>)>,
) -> Result<DataFrame> {
    let date_strs: Vec<String> = dates.iter().map(ToString::to_string).collect();
    let mut cols = Vec::with_capacity(columns.len() + 1);
    cols.push(Column::new("date".into(), date_strs));
    for (name, values) in columns {
        if values.len() != dates.len() {
            return Err(SeriesError::Frame(format!(
                "column {name} has {} values for {} dates",
                values.len(),
                dates.len()
            )));
        }
        cols.push(Column::new(PlSmallStr::from(name.as_str()), values));
    }

    let df = DataFrame::new(cols).map_err(|e| SeriesError::Frame(e.to_string()))?;
    df.lazy()
        .with_column(col("date").cast(DataType::Date))
        .collect()
        .map_err(|e| SeriesError::Frame(e.to_string()))
}
