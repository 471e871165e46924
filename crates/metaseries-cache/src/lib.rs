#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/metaseries/metaseries/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Range-aware caching for the metaseries query engine.
//!
//! The cache degrades, never fails: storage errors are logged and converted
//! to a miss (for reads) or a no-op (for writes), so a corrupted store costs
//! round-trips, not queries.

/// SQLite-backed range cache implementation.
pub mod sqlite;

pub use sqlite::{CacheEntryInfo, CacheKey, RangeCache};
