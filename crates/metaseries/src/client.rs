//! The end-to-end query pipeline.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use futures::future;
use polars::prelude::DataFrame;
use tracing::{debug, info, instrument, warn};

use metaseries_cache::{CacheEntryInfo, CacheKey, RangeCache};
use metaseries_core::catalog::Catalog;
use metaseries_core::error::{Result, SeriesError};
use metaseries_core::frame;
use metaseries_core::frequency::Frequency;
use metaseries_core::processing::{align_to_frequency, wide_to_long};
use metaseries_core::source::FetchOptions;
use metaseries_core::types::{CatalogEntry, FetchRequest, make_column_name};

use crate::registry::SourceRegistry;

/// Shape of the assembled result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One column per logical name, in the caller's order.
    #[default]
    Wide,
    /// `[date, name, value]`, one row per observation.
    Long,
}

/// Options for [`Client::get`].
#[derive(Clone, Debug)]
pub struct GetOptions {
    /// End of the requested range; defaults to today.
    pub end: Option<NaiveDate>,
    /// Target grid for frequency alignment. When absent, native frequencies
    /// are diagnosed and a mismatch warns instead of resampling.
    pub frequency: Option<Frequency>,
    /// Whether to probe and fill the range cache. Default true.
    pub use_cache: bool,
    /// Request source-native multi-series alignment from sources that
    /// support it; caching is bypassed for those sources' entries.
    pub unified: bool,
    /// Source-specific options for the unified mode.
    pub unified_options: BTreeMap<String, String>,
    /// Shape of the result table.
    pub output: OutputFormat,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            end: None,
            frequency: None,
            use_cache: true,
            unified: false,
            unified_options: BTreeMap::new(),
            output: OutputFormat::Wide,
        }
    }
}

impl GetOptions {
    /// Default options: cache on, wide output, end = today.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the end of the range.
    #[must_use]
    pub fn with_end(mut self, end: NaiveDate) -> Self {
        self.end = Some(end);
        self
    }

    /// Sets the alignment frequency.
    #[must_use]
    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    /// Bypasses the cache for this call.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Enables unified mode with the given source options.
    #[must_use]
    pub fn with_unified(mut self, options: BTreeMap<String, String>) -> Self {
        self.unified = true;
        self.unified_options = options;
        self
    }

    /// Requests the long output shape.
    #[must_use]
    pub fn long(mut self) -> Self {
        self.output = OutputFormat::Long;
        self
    }
}

/// Options for [`Client::get_raw`].
#[derive(Clone, Debug)]
pub struct RawOptions {
    /// End of the requested range; defaults to today.
    pub end: Option<NaiveDate>,
    /// Source-specific field.
    pub field: Option<String>,
    /// Source path.
    pub path: Option<String>,
    /// Source-specific extra parameters.
    pub params: Option<BTreeMap<String, String>>,
    /// Whether to probe and fill the range cache. Default true.
    pub use_cache: bool,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            end: None,
            field: None,
            path: None,
            params: None,
            use_cache: true,
        }
    }
}

impl RawOptions {
    /// Default options: cache on, end = today, no field/path/params.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the end of the range.
    #[must_use]
    pub fn with_end(mut self, end: NaiveDate) -> Self {
        self.end = Some(end);
        self
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

    /// Bypasses the cache for this call.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Client for querying time-series data across sources.
///
/// Owns its collaborators by constructor injection: the catalog, the source
/// registry and the range cache. The cache connection lives for the client
/// lifetime; call [`Client::close`] (or drop the client) to release it.
#[derive(Debug)]
pub struct Client {
    catalog: Catalog,
    registry: SourceRegistry,
    cache: RangeCache,
}

impl Client {
    /// Creates a client, validating that every source referenced by the
    /// catalog is registered.
    ///
    /// # Errors
    /// Returns [`SeriesError::UnknownSource`] naming the first unregistered
    /// source.
    pub fn new(catalog: Catalog, registry: SourceRegistry, cache: RangeCache) -> Result<Self> {
        for source in catalog.source_names() {
            if !registry.contains(&source) {
                return Err(SeriesError::UnknownSource {
                    name: source,
                    available: registry.names(),
                });
            }
        }
        info!(
            catalog_entries = catalog.len(),
            cache_enabled = cache.is_enabled(),
            "client initialized"
        );
        Ok(Self {
            catalog,
            registry,
            cache,
        })
    }

    /// Fetches time-series data for a list of catalog names.
    ///
    /// Resolution happens up front: any unknown name fails the whole call
    /// before fetch work starts. Cache misses are grouped by source and
    /// fetched as one batch per source, concurrently across sources; each
    /// resolved column is cached per logical series, so later single-name
    /// queries still hit. A source column that cannot be matched back to
    /// its request is dropped with a warning rather than failing the call.
    ///
    /// # Errors
    /// [`SeriesError::NameNotFound`] for unknown names,
    /// [`SeriesError::NoData`]/[`SeriesError::Fetch`] when a source batch
    /// fails, [`SeriesError::Frame`] on assembly failures.
    #[instrument(skip(self, options), fields(names = names.len(), %start))]
    pub async fn get(
        &self,
        names: &[&str],
        start: NaiveDate,
        options: &GetOptions,
    ) -> Result<DataFrame> {
        let end = options.end.unwrap_or_else(today);

        // Resolve everything first: no partial results on resolution errors.
        let entries = names
            .iter()
            .map(|name| self.catalog.resolve(name).map(Clone::clone))
            .collect::<Result<Vec<CatalogEntry>>>()?;

        if let Some(frequency) = options.frequency {
            info!(%frequency, names = names.len(), "frequency alignment requested");
        }

        let mut frames: BTreeMap<String, DataFrame> = BTreeMap::new();
        let mut misses: Vec<&CatalogEntry> = Vec::new();

        for entry in &entries {
            if options.unified && self.supports_unified(&entry.source) {
                // The unified transform depends on all series together; no
                // single-series cache key is valid for it.
                debug!(name = %entry.name, "cache bypass for unified request");
                misses.push(entry);
                continue;
            }

            if options.use_cache {
                if let Some(cached) = self.cache.get(&entry_key(entry, start, end)) {
                    debug!(name = %entry.name, rows = cached.height(), "fetch from cache");
                    frames.insert(entry.name.clone(), cached);
                    continue;
                }
            }
            misses.push(entry);
        }

        if !misses.is_empty() {
            self.fetch_misses(&misses, start, end, options, &mut frames)
                .await?;
        }

        if let Some(frequency) = options.frequency {
            for (name, df) in &mut frames {
                debug!(name = %name, %frequency, "aligning series");
                *df = align_to_frequency(df, frequency)?;
            }
        } else {
            warn_on_index_mismatch(&frames);
        }

        let wide = assemble(&frames, names)?;
        match options.output {
            OutputFormat::Wide => Ok(wide),
            OutputFormat::Long => wide_to_long(&wide),
        }
    }

    /// Groups cache misses by source, dispatches one batch per source
    /// concurrently, and splits the responses back into per-name frames.
    async fn fetch_misses(
        &self,
        misses: &[&CatalogEntry],
        start: NaiveDate,
        end: NaiveDate,
        options: &GetOptions,
        frames: &mut BTreeMap<String, DataFrame>,
    ) -> Result<()> {
        let fetch_options = if options.unified {
            FetchOptions::unified(options.unified_options.clone())
        } else {
            FetchOptions::new()
        };

        let mut groups: BTreeMap<String, Vec<&CatalogEntry>> = BTreeMap::new();
        for entry in misses {
            groups.entry(entry.source.clone()).or_default().push(*entry);
        }

        let mut batches = Vec::with_capacity(groups.len());
        for (source_name, group) in &groups {
            let source = self.registry.get(source_name)?.clone();
            let requests: Vec<FetchRequest> = group.iter().map(|e| e.to_request()).collect();
            let bypass_cache = options.unified && source.supports_unified();
            let batch_options = fetch_options.clone();
            let source_name = source_name.clone();

            debug!(
                source = %source_name,
                requests = requests.len(),
                "batch fetch from source"
            );
            batches.push(async move {
                let result = source.fetch(&requests, start, end, &batch_options).await;
                (source_name, bypass_cache, result)
            });
        }

        // Concurrent per-source dispatch; this join is the only
        // synchronization barrier before column resolution.
        let results = future::join_all(batches).await;

        for (source_name, bypass_cache, result) in results {
            let response = result?;
            let group = &groups[&source_name];
            self.split_response(group, &response, start, end, options, bypass_cache, frames)?;
        }
        Ok(())
    }

    /// Maps each request's column out of a source response and caches it per
    /// logical series.
    #[allow(clippy::too_many_arguments)]
    fn split_response(
        &self,
        group: &[&CatalogEntry],
        response: &DataFrame,
        start: NaiveDate,
        end: NaiveDate,
        options: &GetOptions,
        bypass_cache: bool,
        frames: &mut BTreeMap<String, DataFrame>,
    ) -> Result<()> {
        let available: Vec<String> = response
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let lower_to_actual: HashMap<String, String> = available
            .iter()
            .map(|c| (c.to_lowercase(), c.clone()))
            .collect();

        for entry in group {
            let with_field = make_column_name(&entry.symbol, entry.field.as_deref());
            let bare = make_column_name(&entry.symbol, None);

            // Fallback chain: exact symbol::field, bare symbol (sources that
            // ignore field), then case-insensitive (sources that normalize
            // case).
            let resolved = if available.iter().any(|c| *c == with_field) {
                Some(with_field.clone())
            } else if available.iter().any(|c| *c == bare) {
                Some(bare.clone())
            } else {
                lower_to_actual
                    .get(&with_field.to_lowercase())
                    .or_else(|| lower_to_actual.get(&bare.to_lowercase()))
                    .cloned()
            };

            let Some(column) = resolved else {
                warn!(
                    name = %entry.name,
                    tried = %format!("{with_field}, {bare}"),
                    available = %available.join(", "),
                    "column not found in source response; dropping name"
                );
                continue;
            };

            let series = frame::single_column(response, &column)?;
            if options.use_cache && !bypass_cache {
                self.cache.put(&entry_key(entry, start, end), &series);
            }
            frames.insert(entry.name.clone(), series);
        }
        Ok(())
    }

    /// Fetches directly from a source, bypassing the catalog.
    ///
    /// Same cache probe/write semantics as [`Client::get`], for a single
    /// ad-hoc request.
    ///
    /// # Errors
    /// [`SeriesError::UnknownSource`] when the source is not registered;
    /// fetch errors propagate as from [`Client::get`].
    #[instrument(skip(self, options), fields(source = %source, symbol = %symbol))]
    pub async fn get_raw(
        &self,
        source: &str,
        symbol: &str,
        start: NaiveDate,
        options: &RawOptions,
    ) -> Result<DataFrame> {
        let end = options.end.unwrap_or_else(today);

        let mut key = CacheKey::new(source, symbol, start, end);
        key.field = options.field.clone();
        key.path = options.path.clone();

        if options.use_cache {
            if let Some(cached) = self.cache.get(&key) {
                debug!("raw fetch served from cache");
                return Ok(cached);
            }
        }

        let adapter = self.registry.get(source)?;
        let request = FetchRequest {
            symbol: symbol.to_string(),
            field: options.field.clone(),
            path: options.path.clone(),
            params: options.params.clone(),
        };

        debug!("raw fetch from source");
        let df = adapter
            .fetch(&[request], start, end, &FetchOptions::new())
            .await?;

        if options.use_cache {
            self.cache.put(&key, &df);
        }
        Ok(df)
    }

    /// Retrieves metadata for a catalog name: source-supplied entries merged
    /// with catalog entries, the catalog taking precedence on collisions.
    ///
    /// # Errors
    /// [`SeriesError::NameNotFound`] when the name is not in the catalog.
    pub async fn get_metadata(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let entry = self.catalog.resolve(name)?;
        let source = self.registry.get(&entry.source)?;

        let mut metadata = source.metadata(&entry.symbol).await?;
        debug!(name = %name, source = %entry.source, "get metadata");

        metadata.insert("name".to_string(), entry.name.clone());
        metadata.insert("source".to_string(), entry.source.clone());
        metadata.insert("symbol".to_string(), entry.symbol.clone());
        if let Some(field) = &entry.field {
            metadata.insert("field".to_string(), field.clone());
        }
        if let Some(description) = &entry.description {
            metadata.insert("description".to_string(), description.clone());
        }
        if let Some(unit) = &entry.unit {
            metadata.insert("unit".to_string(), unit.clone());
        }
        Ok(metadata)
    }

    /// Clears cached data, optionally scoped to one source.
    ///
    /// # Errors
    /// Returns [`SeriesError::Cache`] on storage failure.
    pub fn clear_cache(&self, source: Option<&str>) -> Result<()> {
        self.cache.clear(source, None)
    }

    /// Lists all cached entries.
    ///
    /// # Errors
    /// Returns [`SeriesError::Cache`] on storage failure.
    pub fn list_cached(&self) -> Result<Vec<CacheEntryInfo>> {
        self.cache.list_entries()
    }

    /// Releases the cache connection; safe to call more than once.
    pub fn close(&self) {
        self.cache.close();
        debug!("client closed");
    }

    /// The catalog backing this client.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn supports_unified(&self, source: &str) -> bool {
        self.registry
            .get(source)
            .map(|s| s.supports_unified())
            .unwrap_or(false)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn entry_key(entry: &CatalogEntry, start: NaiveDate, end: NaiveDate) -> CacheKey {
    CacheKey {
        source: entry.source.clone(),
        symbol: entry.symbol.clone(),
        field: entry.field.clone(),
        path: entry.path.clone(),
        start,
        end,
    }
}

/// Warns when series on different native grids are about to be outer-joined.
fn warn_on_index_mismatch(frames: &BTreeMap<String, DataFrame>) {
    if frames.len() <= 1 {
        return;
    }

    let mut inferred: Vec<(&str, Option<Frequency>, Vec<NaiveDate>)> = Vec::new();
    for (name, df) in frames {
        let dates = frame::column_dates(df).unwrap_or_default();
        inferred.push((name.as_str(), Frequency::infer(&dates), dates));
    }

    let distinct: HashSet<Option<Frequency>> =
        inferred.iter().map(|(_, freq, _)| *freq).collect();

    if distinct.len() > 1 {
        let summary = inferred
            .iter()
            .map(|(name, freq, _)| match freq {
                Some(f) => format!("{name}={f}"),
                None => format!("{name}=irregular"),
            })
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            %summary,
            "series have different frequencies; outer join may produce missing values"
        );
    } else if distinct.contains(&None) {
        let first = &inferred[0].2;
        if inferred.iter().skip(1).any(|(_, _, dates)| dates != first) {
            warn!(
                "irregular series have different dates; outer join may produce missing values"
            );
        }
    }
}

/// Outer-joins per-name frames on date and orders columns as requested.
fn assemble(frames: &BTreeMap<String, DataFrame>, names: &[&str]) -> Result<DataFrame> {
    let ordered: Vec<&str> = names
        .iter()
        .filter(|name| frames.contains_key(**name))
        .copied()
        .collect();
    if ordered.is_empty() {
        return Ok(DataFrame::empty());
    }

    let mut all_dates: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut series: Vec<(String, BTreeMap<NaiveDate, f64>)> = Vec::with_capacity(ordered.len());

    for name in &ordered {
        let df = &frames[*name];
        let value_column = frame::value_column_names(df)
            .first()
            .cloned()
            .ok_or_else(|| {
                SeriesError::Frame(format!("series {name} has no value column"))
            })?;
        let dates = frame::column_dates(df)?;
        let values = frame::column_values(df, &value_column)?;

        let mut map = BTreeMap::new();
        for (date, value) in dates.iter().zip(values) {
            all_dates.insert(*date);
            if let Some(v) = value {
                map.insert(*date, v);
            }
        }
        series.push(((*name).to_string(), map));
    }

    let grid: Vec<NaiveDate> = all_dates.into_iter().collect();
    let columns: Vec<(String, Vec<Option<f64>>)> = series
        .into_iter()
        .map(|(name, map)| {
            let values = grid.iter().map(|date| map.get(date).copied()).collect();
            (name, values)
        })
        .collect();

    frame::wide_frame(&grid, columns)
}
