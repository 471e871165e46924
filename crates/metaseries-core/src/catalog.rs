//! Catalog of logical series names.
//!
//! The catalog is a static lookup table from caller-facing names to
//! [`CatalogEntry`] rows. Loading and validating catalog files happens
//! upstream; by the time a catalog reaches the client it is an in-memory
//! table built with [`Catalog::from_entries`].

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::error::{Result, SeriesError};
use crate::types::CatalogEntry;

/// How many known names a `NameNotFound` error lists as a hint.
const KNOWN_NAME_SAMPLE: usize = 10;

/// Lookup table from logical names to source requests.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog from entries, rejecting duplicate logical names.
    ///
    /// # Errors
    /// Returns [`SeriesError::DuplicateName`] when two entries share a name.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            if map.contains_key(&entry.name) {
                return Err(SeriesError::DuplicateName(entry.name));
            }
            map.insert(entry.name.clone(), entry);
        }
        Ok(Self { entries: map })
    }

    /// Resolves a logical name to its entry.
    ///
    /// # Errors
    /// Returns [`SeriesError::NameNotFound`] with a sample of known names.
    pub fn resolve(&self, name: &str) -> Result<&CatalogEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| SeriesError::NameNotFound {
                name: name.to_string(),
                known: self
                    .entries
                    .keys()
                    .take(KNOWN_NAME_SAMPLE)
                    .cloned()
                    .collect(),
            })
    }

    /// All logical names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// The distinct source names referenced by catalog entries.
    #[must_use]
    pub fn source_names(&self) -> BTreeSet<String> {
        self.entries.values().map(|e| e.source.clone()).collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
