//! The `Source` trait that all data adapters implement.
//!
//! A source receives an ordered batch of [`FetchRequest`]s plus one shared
//! date range and returns a single frame with a `date` column and one value
//! column per request, named per [`make_column_name`](crate::make_column_name).
//!
//! "No data in range" and "retrieval failed" are distinct outcomes
//! ([`SeriesError::NoData`](crate::SeriesError::NoData) vs
//! [`SeriesError::Fetch`](crate::SeriesError::Fetch)); the client's fallback
//! and warning logic depends on the distinction. Adapters whose backing
//! dependency is missing report
//! [`SeriesError::SourceUnavailable`](crate::SeriesError::SourceUnavailable)
//! from their constructor rather than probing at fetch time.

use async_trait::async_trait;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::Result;
use crate::types::FetchRequest;

/// Options shared by every request in a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Requests the source's native multi-series alignment (a server-side
    /// join across all requested series). Sources that do not support it
    /// ignore the flag.
    pub unified: bool,
    /// Source-specific options for the unified mode (target frequency,
    /// currency, calendar merge mode, ...).
    pub unified_options: BTreeMap<String, String>,
}

impl FetchOptions {
    /// Options with everything off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables unified mode with the given options.
    #[must_use]
    pub fn unified(options: BTreeMap<String, String>) -> Self {
        Self {
            unified: true,
            unified_options: options,
        }
    }
}

/// Contract for a pluggable data source adapter.
#[async_trait]
pub trait Source: Send + Sync + Debug {
    /// The registry name of this source (e.g. `"localfile"`).
    fn name(&self) -> &str;

    /// Whether this source implements the unified multi-series mode. When a
    /// query runs with [`FetchOptions::unified`] set, caching is bypassed
    /// for entries on sources that return `true` here: the joint result is a
    /// function of all requested series together, so no single-series cache
    /// key is valid for it.
    fn supports_unified(&self) -> bool {
        false
    }

    /// Fetches time-series data for a batch of requests over one shared
    /// range.
    ///
    /// Returns a frame with a `date` column and one column per request,
    /// named `symbol::field` or bare `symbol`.
    ///
    /// # Errors
    /// [`SeriesError::NoData`](crate::SeriesError::NoData) when the range
    /// holds no observations; [`SeriesError::Fetch`](crate::SeriesError::Fetch)
    /// when retrieval fails.
    async fn fetch(
        &self,
        requests: &[FetchRequest],
        start: NaiveDate,
        end: NaiveDate,
        options: &FetchOptions,
    ) -> Result<DataFrame>;

    /// Retrieves descriptive metadata for a symbol (description, unit,
    /// frequency, ...).
    async fn metadata(&self, symbol: &str) -> Result<BTreeMap<String, String>>;
}
