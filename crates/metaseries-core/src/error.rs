//! Error types for query operations.
//!
//! This module defines [`SeriesError`] which covers resolution, fetch, cache
//! and processing failures. Resolution errors abort a query before any fetch
//! work starts; fetch errors distinguish "no data in range" from "retrieval
//! failed"; cache errors never escape the cache layer.

use thiserror::Error;

/// Errors that can occur while resolving, fetching or assembling series data.
#[derive(Error, Debug)]
pub enum SeriesError {
    /// A queried logical name is not in the catalog.
    #[error("Name not found: {name}. Known names include: {}", .known.join(", "))]
    NameNotFound {
        /// The name that failed to resolve.
        name: String,
        /// A sample of valid catalog names.
        known: Vec<String>,
    },

    /// Two catalog entries share the same logical name.
    #[error("Duplicate catalog name: {0}")]
    DuplicateName(String),

    /// A catalog entry or request references a source that is not registered.
    #[error("Unknown source: {name}. Available sources: {}", .available.join(", "))]
    UnknownSource {
        /// The source name that failed to resolve.
        name: String,
        /// The registered source names.
        available: Vec<String>,
    },

    /// A source adapter's backing dependency is absent.
    #[error("Source {source} unavailable: {reason}")]
    SourceUnavailable {
        /// The adapter that cannot be constructed.
        source: String,
        /// Why the adapter is unavailable.
        reason: String,
    },

    /// A source returned no observations for the requested range.
    #[error("No data for {symbol} in range {start} to {end}")]
    NoData {
        /// The symbol that was requested.
        symbol: String,
        /// Start of the requested range.
        start: String,
        /// End of the requested range.
        end: String,
    },

    /// Data retrieval from a source failed.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Error interacting with the cache store.
    #[error("Cache error: {0}")]
    Cache(String),

    /// An invalid frequency specifier was supplied.
    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    /// A request is malformed (missing path, bad argument combination, ...).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A DataFrame operation failed during processing or assembly.
    #[error("Frame error: {0}")]
    Frame(String),
}

impl From<polars::error::PolarsError> for SeriesError {
    fn from(e: polars::error::PolarsError) -> Self {
        Self::Frame(e.to_string())
    }
}

/// Result type alias using [`SeriesError`].
pub type Result<T> = std::result::Result<T, SeriesError>;
