//! Core value types for series queries.
//!
//! This module defines the request and catalog value types:
//!
//! - [`FetchRequest`] - One item of a batched source request
//! - [`CatalogEntry`] - A resolved catalog row consumed by the client
//! - [`make_column_name`] - The wire naming contract for source columns

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Builds the column name a source uses for a request.
///
/// With a field the name is `symbol::field` (e.g. `"SPX Index::PX_LAST"`),
/// otherwise it is the bare symbol. Sources name their returned columns with
/// this scheme; the client resolves them back with the same helper.
#[must_use]
pub fn make_column_name(symbol: &str, field: Option<&str>) -> String {
    match field {
        Some(f) => format!("{symbol}::{f}"),
        None => symbol.to_string(),
    }
}

/// One item of a batched source request.
///
/// `field` and `path` are independently optional: a source may use neither,
/// either, or both. `params` carries source-specific free-form options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Source-specific symbol identifier (e.g. `"SPX Index"`).
    pub symbol: String,
    /// Source-specific field name (e.g. `"PX_LAST"`).
    pub field: Option<String>,
    /// Source path (e.g. a file path for the localfile source).
    pub path: Option<String>,
    /// Source-specific extra parameters.
    pub params: Option<BTreeMap<String, String>>,
}

impl FetchRequest {
    /// Creates a request for a bare symbol.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// Sets the field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Sets the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the extra parameters.
    #[must_use]
    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = Some(params);
        self
    }

    /// The column name this request expects in a source response.
    #[must_use]
    pub fn column_name(&self) -> String {
        make_column_name(&self.symbol, self.field.as_deref())
    }
}

/// A catalog row mapping a logical name to a source request.
///
/// `name` is globally unique within a catalog; `source` must name a
/// registered adapter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Caller-facing logical name for this series.
    pub name: String,
    /// Name of the registered source adapter (e.g. `"localfile"`).
    pub source: String,
    /// Source-specific symbol identifier.
    pub symbol: String,
    /// Source-specific field name.
    pub field: Option<String>,
    /// Source path (e.g. a file path for the localfile source).
    pub path: Option<String>,
    /// Source-specific extra parameters.
    pub params: Option<BTreeMap<String, String>>,
    /// Human-readable description of the series.
    pub description: Option<String>,
    /// Unit of measurement (e.g. `"USD billions"`).
    pub unit: Option<String>,
}

impl CatalogEntry {
    /// Creates an entry with the required fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// Sets the field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Sets the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the extra parameters.
    #[must_use]
    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = Some(params);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Builds the [`FetchRequest`] for this entry.
    #[must_use]
    pub fn to_request(&self) -> FetchRequest {
        FetchRequest {
            symbol: self.symbol.clone(),
            field: self.field.clone(),
            path: self.path.clone(),
            params: self.params.clone(),
        }
    }
}
