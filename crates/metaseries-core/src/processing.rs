//! Frequency alignment and wide/long reshaping.

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use tracing::debug;

use crate::error::{Result, SeriesError};
use crate::frame;
use crate::frequency::Frequency;

/// Resamples a single-series frame onto the regular grid of
/// `target_frequency`.
///
/// Downsampling (e.g. daily to monthly) keeps the last observation of each
/// period. Upsampling (e.g. monthly to daily) forward-fills the most recent
/// prior value; periods before the first observation stay null. The
/// operation is pure and idempotent: a frame already on the target grid
/// comes back with identical values.
///
/// # Errors
/// Returns [`SeriesError::Frame`] when the frame has no value column or the
/// date column is unusable.
pub fn align_to_frequency(df: &DataFrame, target_frequency: Frequency) -> Result<DataFrame> {
    let value_names = frame::value_column_names(df);
    let value_name = value_names
        .first()
        .ok_or_else(|| SeriesError::Frame("no value column to align".to_string()))?;

    debug!(
        rows = df.height(),
        frequency = %target_frequency,
        "aligning frequency"
    );

    let dates = frame::column_dates(df)?;
    let values = frame::column_values(df, value_name)?;
    if dates.is_empty() {
        return frame::frame_from_series(value_name, &[], &[]);
    }

    let mut observations: Vec<(NaiveDate, Option<f64>)> =
        dates.into_iter().zip(values).collect();
    observations.sort_by_key(|(date, _)| *date);

    // Last non-null observation per period label.
    let mut last_per_label: std::collections::BTreeMap<NaiveDate, f64> =
        std::collections::BTreeMap::new();
    for (date, value) in &observations {
        if let Some(v) = value {
            last_per_label.insert(target_frequency.period_end(*date), *v);
        }
    }

    let first_label = target_frequency.period_end(observations[0].0);
    let last_label = target_frequency.period_end(observations[observations.len() - 1].0);

    let mut grid = Vec::new();
    let mut label = first_label;
    while label <= last_label {
        grid.push(label);
        label = target_frequency.advance(label);
    }

    let mut filled = Vec::with_capacity(grid.len());
    let mut previous: Option<f64> = None;
    for label in &grid {
        let value = match last_per_label.get(label) {
            Some(v) => {
                previous = Some(*v);
                Some(*v)
            }
            None => previous,
        };
        filled.push(value);
    }

    debug!(
        input_rows = observations.len(),
        output_rows = grid.len(),
        "alignment complete"
    );
    frame::frame_from_series(value_name, &grid, &filled)
}

/// Converts a wide frame (one column per series) into the long projection
/// with columns `[date, name, value]`, one row per observation, sorted by
/// name then date.
pub fn wide_to_long(df: &DataFrame) -> Result<DataFrame> {
    use polars::prelude::*;

    let mut names = frame::value_column_names(df);
    names.sort();

    if df.height() == 0 || names.is_empty() {
        let empty = DataFrame::new(vec![
            Column::new("date".into(), Vec::<String>::new()),
            Column::new("name".into(), Vec::<String>::new()),
            Column::new("value".into(), Vec::<Option<f64>>::new()),
        ])
        .map_err(|e| SeriesError::Frame(e.to_string()))?;
        return empty
            .lazy()
            .with_column(col("date").cast(DataType::Date))
            .collect()
            .map_err(|e| SeriesError::Frame(e.to_string()));
    }

    let dates = frame::column_dates(df)?;
    let mut out_dates: Vec<String> = Vec::with_capacity(dates.len() * names.len());
    let mut out_names: Vec<String> = Vec::with_capacity(dates.len() * names.len());
    let mut out_values: Vec<Option<f64>> = Vec::with_capacity(dates.len() * names.len());

    for name in &names {
        let values = frame::column_values(df, name)?;
        for (date, value) in dates.iter().zip(values) {
            out_dates.push(date.to_string());
            out_names.push(name.clone());
            out_values.push(value);
        }
    }

    let long = DataFrame::new(vec![
        Column::new("date".into(), out_dates),
        Column::new("name".into(), out_names),
        Column::new("value".into(), out_values),
    ])
    .map_err(|e| SeriesError::Frame(e.to_string()))?;

    long.lazy()
        .with_column(col("date").cast(DataType::Date))
        .collect()
        .map_err(|e| SeriesError::Frame(e.to_string()))
}
