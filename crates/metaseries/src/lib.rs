#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/metaseries/metaseries/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Unified query interface over heterogeneous time-series data sources.
//!
//! This crate ties the workspace together: it re-exports the core types,
//! the range cache and the bundled source adapters, and provides
//! [`SourceRegistry`] plus [`Client`], the end-to-end query pipeline.
//!
//! # Features
//!
//! - `localfile` - bundle the local CSV/Parquet source adapter

// Core types and traits
pub use metaseries_core::*;

// Cache
pub use metaseries_cache::{CacheEntryInfo, CacheKey, RangeCache};

// Bundled sources
#[cfg(feature = "localfile")]
pub use metaseries_localfile::LocalFileSource;

mod client;
mod registry;

pub use client::{Client, GetOptions, OutputFormat, RawOptions};
pub use registry::SourceRegistry;
