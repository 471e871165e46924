#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/metaseries/metaseries/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the metaseries query engine.
//!
//! This crate provides the foundational abstractions shared by the cache,
//! the source adapters and the client:
//!
//! - [`Source`](source::Source) - Contract every data source adapter satisfies
//! - [`Catalog`](catalog::Catalog) - Logical name to source-request mapping
//! - [`Frequency`](frequency::Frequency) - Period model and inference
//! - [`align_to_frequency`](processing::align_to_frequency) - Grid resampling
//! - [`FetchRequest`](types::FetchRequest) - One item of a source batch

/// Catalog of logical series names.
pub mod catalog;
/// Error types for query operations.
pub mod error;
/// Shared DataFrame helpers (normalization, range filtering, accessors).
pub mod frame;
/// Period model: frequency parsing, period labels and inference.
pub mod frequency;
/// Frequency alignment and wide/long reshaping.
pub mod processing;
/// The `Source` trait that all data adapters implement.
pub mod source;
/// Core value types (FetchRequest, CatalogEntry, column naming).
pub mod types;

// Re-export commonly used items at crate root
pub use catalog::Catalog;
pub use error::{Result, SeriesError};
pub use frequency::Frequency;
pub use processing::{align_to_frequency, wide_to_long};
pub use source::{FetchOptions, Source};
pub use types::{CatalogEntry, FetchRequest, make_column_name};
