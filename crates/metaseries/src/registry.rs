//! Explicit map from source names to adapter instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use metaseries_core::error::{Result, SeriesError};
use metaseries_core::source::Source;

/// Registry of source adapters, keyed by adapter name.
///
/// Populated explicitly at construction and passed into
/// [`Client::new`](crate::Client::new); there is no global registry and no
/// runtime discovery.
#[derive(Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn Source>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its [`Source::name`]. A second adapter
    /// with the same name replaces the first.
    pub fn register(&mut self, source: Arc<dyn Source>) {
        debug!(source = source.name(), "registering source");
        self.sources.insert(source.name().to_string(), source);
    }

    /// Registers an adapter, builder style.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn Source>) -> Self {
        self.register(source);
        self
    }

    /// Adds the bundled local file adapter.
    #[cfg(feature = "localfile")]
    #[must_use]
    pub fn with_localfile(self) -> Self {
        self.with_source(Arc::new(metaseries_localfile::LocalFileSource::new()))
    }

    /// Looks up an adapter by name.
    ///
    /// # Errors
    /// Returns [`SeriesError::UnknownSource`] listing the registered names.
    pub fn get(&self, name: &str) -> Result<&Arc<dyn Source>> {
        self.sources
            .get(name)
            .ok_or_else(|| SeriesError::UnknownSource {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Whether an adapter is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// The registered adapter names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
