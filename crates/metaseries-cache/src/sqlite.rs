//! SQLite-backed range cache implementation.

use chrono::NaiveDate;
use polars::prelude::*;
use rusqlite::{Connection, OptionalExtension, params};
use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use metaseries_core::error::{Result, SeriesError};
use metaseries_core::frame;

/// Environment variable overriding the cache database location.
pub const CACHE_PATH_ENV: &str = "METASERIES_CACHE_PATH";

/// Default cache database location when the environment variable is unset.
pub const DEFAULT_CACHE_PATH: &str = "./cache/series_cache.db";

/// Composite key identifying one cached series over one date range.
///
/// `field` and `path` are independently nullable; a stored `None` matches
/// only a requested `None`, never a value. The store enforces this with SQL
/// `IS` comparisons rather than `=`, whose NULL semantics differ from value
/// equality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    /// Source adapter name.
    pub source: String,
    /// Source-specific symbol.
    pub symbol: String,
    /// Source-specific field, when the source uses one.
    pub field: Option<String>,
    /// Source path, when the source uses one.
    pub path: Option<String>,
    /// Start of the covered range (inclusive).
    pub start: NaiveDate,
    /// End of the covered range (inclusive).
    pub end: NaiveDate,
}

impl CacheKey {
    /// Creates a key with no field or path.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        symbol: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            source: source.into(),
            symbol: symbol.into(),
            field: None,
            path: None,
            start,
            end,
        }
    }

    /// Sets the field component.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Sets the path component.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A stored key as reported by [`RangeCache::list_entries`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntryInfo {
    /// Source adapter name.
    pub source: String,
    /// Source-specific symbol.
    pub symbol: String,
    /// Source-specific field.
    pub field: Option<String>,
    /// Source path.
    pub path: Option<String>,
    /// Start of the covered range.
    pub start: NaiveDate,
    /// End of the covered range.
    pub end: NaiveDate,
}

/// Durable range-containment cache over SQLite.
///
/// One connection per instance, held for the instance lifetime. Not designed
/// for concurrent writers from multiple processes; same-process callers
/// sharing an instance serialize on the internal lock.
///
/// `put` and `get` never surface storage errors: failures are logged and
/// degrade to a no-op or a miss.
#[derive(Debug)]
pub struct RangeCache {
    conn: Mutex<Option<Connection>>,
    enabled: bool,
}

impl RangeCache {
    /// Opens (creating if needed) a cache database at `path`.
    ///
    /// # Errors
    /// Returns [`SeriesError::Cache`] when the database cannot be opened or
    /// the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SeriesError::Cache(e.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(|e| SeriesError::Cache(e.to_string()))?;
        let cache = Self {
            conn: Mutex::new(Some(conn)),
            enabled: true,
        };
        cache.initialize_schema()?;
        info!(path = %path.display(), "cache initialized");
        Ok(cache)
    }

    /// Opens the cache at the location given by the `METASERIES_CACHE_PATH`
    /// environment variable, falling back to [`DEFAULT_CACHE_PATH`].
    ///
    /// # Errors
    /// Returns [`SeriesError::Cache`] when the database cannot be opened.
    pub fn open_default() -> Result<Self> {
        let path =
            std::env::var(CACHE_PATH_ENV).unwrap_or_else(|_| DEFAULT_CACHE_PATH.to_string());
        Self::open(path)
    }

    /// Creates an in-memory cache; data is lost when the cache is dropped.
    ///
    /// # Errors
    /// Returns [`SeriesError::Cache`] when schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| SeriesError::Cache(e.to_string()))?;
        let cache = Self {
            conn: Mutex::new(Some(conn)),
            enabled: true,
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Creates a disabled cache: every `get` misses, every `put` is a no-op,
    /// and no storage file is created.
    #[must_use]
    pub fn disabled() -> Self {
        debug!("cache disabled");
        Self {
            conn: Mutex::new(None),
            enabled: false,
        }
    }

    /// Whether caching is enabled for this instance.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Create tables and indexes, migrating destructively from the old
    /// schema (without the `path` column) when one is found.
    fn initialize_schema(&self) -> Result<()> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| SeriesError::Cache(e.to_string()))?;
        let Some(conn) = guard.as_ref() else {
            return Ok(());
        };

        let existing: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type='table' AND name='cache_entries'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SeriesError::Cache(e.to_string()))?;
        if let Some(sql) = existing {
            if !sql.contains("path TEXT") {
                info!("cache migration: dropping old schema without path column");
                conn.execute("DROP TABLE IF EXISTS cache_data", [])
                    .map_err(|e| SeriesError::Cache(e.to_string()))?;
                conn.execute("DROP TABLE IF EXISTS cache_entries", [])
                    .map_err(|e| SeriesError::Cache(e.to_string()))?;
            }
        }

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                symbol TEXT NOT NULL,
                field TEXT,
                path TEXT,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(source, symbol, field, path, start_date, end_date)
            )",
            [],
        )
        .map_err(|e| SeriesError::Cache(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_data (
                entry_id INTEGER PRIMARY KEY,
                data BLOB NOT NULL,
                FOREIGN KEY (entry_id) REFERENCES cache_entries(id)
                    ON DELETE CASCADE
            )",
            [],
        )
        .map_err(|e| SeriesError::Cache(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cache_lookup
             ON cache_entries(source, symbol, field, path)",
            [],
        )
        .map_err(|e| SeriesError::Cache(e.to_string()))?;

        debug!("cache schema initialized");
        Ok(())
    }

    /// Stores a frame under `key`, replacing any record with the exact same
    /// composite key.
    ///
    /// Write failures are logged and swallowed: an uncached round-trip is
    /// safe, a crashed query is not.
    #[instrument(skip(self, df), fields(source = %key.source, symbol = %key.symbol))]
    pub fn put(&self, key: &CacheKey, df: &DataFrame) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.try_put(key, df) {
            warn!(
                source = %key.source,
                symbol = %key.symbol,
                error = %e,
                "cache put failed"
            );
        }
    }

    fn try_put(&self, key: &CacheKey, df: &DataFrame) -> Result<()> {
        let mut buf: Vec<u8> = Vec::new();
        ParquetWriter::new(&mut buf)
            .finish(&mut df.clone())
            .map_err(|e| SeriesError::Cache(e.to_string()))?;

        let guard = self
            .conn
            .lock()
            .map_err(|e| SeriesError::Cache(e.to_string()))?;
        let Some(conn) = guard.as_ref() else {
            return Ok(());
        };

        let start = key.start.to_string();
        let end = key.end.to_string();

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| SeriesError::Cache(e.to_string()))?;

        // Overwrite semantics: drop any record under the exact key first.
        tx.execute(
            "DELETE FROM cache_data WHERE entry_id IN (
                SELECT id FROM cache_entries
                WHERE source = ?1 AND symbol = ?2 AND field IS ?3 AND path IS ?4
                  AND start_date = ?5 AND end_date = ?6
            )",
            params![key.source, key.symbol, key.field, key.path, start, end],
        )
        .map_err(|e| SeriesError::Cache(e.to_string()))?;
        tx.execute(
            "DELETE FROM cache_entries
             WHERE source = ?1 AND symbol = ?2 AND field IS ?3 AND path IS ?4
               AND start_date = ?5 AND end_date = ?6",
            params![key.source, key.symbol, key.field, key.path, start, end],
        )
        .map_err(|e| SeriesError::Cache(e.to_string()))?;

        tx.execute(
            "INSERT INTO cache_entries (source, symbol, field, path, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![key.source, key.symbol, key.field, key.path, start, end],
        )
        .map_err(|e| SeriesError::Cache(e.to_string()))?;
        let entry_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO cache_data (entry_id, data) VALUES (?1, ?2)",
            params![entry_id, buf],
        )
        .map_err(|e| SeriesError::Cache(e.to_string()))?;

        tx.commit().map_err(|e| SeriesError::Cache(e.to_string()))?;
        debug!(
            range = %format!("{start}/{end}"),
            rows = df.height(),
            "cache put"
        );
        Ok(())
    }

    /// Retrieves the series for `key`, if a stored record matches the
    /// composite `(source, symbol, field, path)` exactly (null-aware) and
    /// its range contains the requested one.
    ///
    /// A containing superset is filtered down to exactly the requested
    /// sub-range. When several stored ranges contain the request, the
    /// narrowest wins, with the most recently created record breaking ties.
    /// Read failures and corrupt records are logged and reported as a miss.
    #[instrument(skip(self), fields(source = %key.source, symbol = %key.symbol))]
    pub fn get(&self, key: &CacheKey) -> Option<DataFrame> {
        if !self.enabled {
            return None;
        }
        match self.try_get(key) {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    source = %key.source,
                    symbol = %key.symbol,
                    error = %e,
                    "cache get failed"
                );
                None
            }
        }
    }

    fn try_get(&self, key: &CacheKey) -> Result<Option<DataFrame>> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| SeriesError::Cache(e.to_string()))?;
        let Some(conn) = guard.as_ref() else {
            return Ok(None);
        };

        let start = key.start.to_string();
        let end = key.end.to_string();

        let row: Option<(String, String, Vec<u8>)> = conn
            .query_row(
                "SELECT ce.start_date, ce.end_date, cd.data
                 FROM cache_entries ce
                 JOIN cache_data cd ON cd.entry_id = ce.id
                 WHERE ce.source = ?1 AND ce.symbol = ?2
                   AND ce.field IS ?3 AND ce.path IS ?4
                   AND ce.start_date <= ?5 AND ce.end_date >= ?6
                 ORDER BY julianday(ce.end_date) - julianday(ce.start_date) ASC,
                          ce.id DESC
                 LIMIT 1",
                params![key.source, key.symbol, key.field, key.path, start, end],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| SeriesError::Cache(e.to_string()))?;

        let Some((cached_start, cached_end, blob)) = row else {
            debug!("cache miss");
            return Ok(None);
        };

        let df = ParquetReader::new(Cursor::new(blob))
            .finish()
            .map_err(|e| SeriesError::Cache(e.to_string()))?;

        // Never hand back more rows than requested.
        let df = if cached_start != start || cached_end != end {
            frame::filter_range(&df, key.start, key.end)
                .map_err(|e| SeriesError::Cache(e.to_string()))?
        } else {
            df
        };

        debug!(rows = df.height(), "cache hit");
        Ok(Some(df))
    }

    /// Clears cache entries.
    ///
    /// With no arguments every record is deleted. With a source alone, every
    /// record for that source. With both, every record for that
    /// `(source, symbol)` pair across all field/path/range combinations.
    ///
    /// # Errors
    /// A symbol without a source is rejected with
    /// [`SeriesError::InvalidRequest`]; storage errors surface as
    /// [`SeriesError::Cache`].
    pub fn clear(&self, source: Option<&str>, symbol: Option<&str>) -> Result<()> {
        if symbol.is_some() && source.is_none() {
            return Err(SeriesError::InvalidRequest(
                "clearing by symbol requires a source".to_string(),
            ));
        }

        let guard = self
            .conn
            .lock()
            .map_err(|e| SeriesError::Cache(e.to_string()))?;
        let Some(conn) = guard.as_ref() else {
            return Ok(());
        };

        match (source, symbol) {
            (Some(source), Some(symbol)) => {
                conn.execute(
                    "DELETE FROM cache_data WHERE entry_id IN (
                        SELECT id FROM cache_entries WHERE source = ?1 AND symbol = ?2
                    )",
                    params![source, symbol],
                )
                .map_err(|e| SeriesError::Cache(e.to_string()))?;
                conn.execute(
                    "DELETE FROM cache_entries WHERE source = ?1 AND symbol = ?2",
                    params![source, symbol],
                )
                .map_err(|e| SeriesError::Cache(e.to_string()))?;
                info!(source, symbol, "cache cleared");
            }
            (Some(source), None) => {
                conn.execute(
                    "DELETE FROM cache_data WHERE entry_id IN (
                        SELECT id FROM cache_entries WHERE source = ?1
                    )",
                    params![source],
                )
                .map_err(|e| SeriesError::Cache(e.to_string()))?;
                conn.execute(
                    "DELETE FROM cache_entries WHERE source = ?1",
                    params![source],
                )
                .map_err(|e| SeriesError::Cache(e.to_string()))?;
                info!(source, "cache cleared");
            }
            (None, _) => {
                conn.execute("DELETE FROM cache_data", [])
                    .map_err(|e| SeriesError::Cache(e.to_string()))?;
                conn.execute("DELETE FROM cache_entries", [])
                    .map_err(|e| SeriesError::Cache(e.to_string()))?;
                info!("cache cleared: all entries");
            }
        }
        Ok(())
    }

    /// Deletes every record matching the null-aware composite prefix
    /// `(source, symbol, field, path)` regardless of cached range. Returns
    /// the number of records removed, so a second call returns 0.
    ///
    /// # Errors
    /// Returns [`SeriesError::Cache`] on storage failure.
    pub fn clear_symbol(
        &self,
        source: &str,
        symbol: &str,
        field: Option<&str>,
        path: Option<&str>,
    ) -> Result<usize> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| SeriesError::Cache(e.to_string()))?;
        let Some(conn) = guard.as_ref() else {
            return Ok(0);
        };

        conn.execute(
            "DELETE FROM cache_data WHERE entry_id IN (
                SELECT id FROM cache_entries
                WHERE source = ?1 AND symbol = ?2 AND field IS ?3 AND path IS ?4
            )",
            params![source, symbol, field, path],
        )
        .map_err(|e| SeriesError::Cache(e.to_string()))?;

        let count = conn
            .execute(
                "DELETE FROM cache_entries
                 WHERE source = ?1 AND symbol = ?2 AND field IS ?3 AND path IS ?4",
                params![source, symbol, field, path],
            )
            .map_err(|e| SeriesError::Cache(e.to_string()))?;

        info!(source, symbol, count, "cache cleared for symbol");
        Ok(count)
    }

    /// Enumerates stored keys without deserializing payloads.
    ///
    /// # Errors
    /// Returns [`SeriesError::Cache`] on storage failure.
    pub fn list_entries(&self) -> Result<Vec<CacheEntryInfo>> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| SeriesError::Cache(e.to_string()))?;
        let Some(conn) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        let mut stmt = conn
            .prepare(
                "SELECT source, symbol, field, path, start_date, end_date
                 FROM cache_entries
                 ORDER BY source, symbol",
            )
            .map_err(|e| SeriesError::Cache(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| SeriesError::Cache(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let (source, symbol, field, path, start, end) =
                row.map_err(|e| SeriesError::Cache(e.to_string()))?;
            let start = NaiveDate::parse_from_str(&start, "%Y-%m-%d")
                .map_err(|e| SeriesError::Cache(e.to_string()))?;
            let end = NaiveDate::parse_from_str(&end, "%Y-%m-%d")
                .map_err(|e| SeriesError::Cache(e.to_string()))?;
            entries.push(CacheEntryInfo {
                source,
                symbol,
                field,
                path,
                start,
                end,
            });
        }
        Ok(entries)
    }

    /// Releases the storage handle. Safe to call more than once; subsequent
    /// operations behave as misses and no-ops.
    pub fn close(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            if guard.take().is_some() {
                debug!("cache closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaseries_core::frame::{column_dates, column_values, frame_from_series};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn daily_frame(start: NaiveDate, days: u64) -> DataFrame {
        let dates: Vec<NaiveDate> = (0..days).map(|i| start + chrono::Days::new(i)).collect();
        let values: Vec<Option<f64>> = (0..days).map(|i| Some(i as f64)).collect();
        frame_from_series("value", &dates, &values).unwrap()
    }

    fn jan_key() -> CacheKey {
        CacheKey::new("bloomberg", "SPX Index", d(2024, 1, 1), d(2024, 1, 31))
            .with_field("PX_LAST")
    }

    #[test]
    fn get_on_empty_cache_misses() {
        let cache = RangeCache::in_memory().unwrap();
        assert!(cache.get(&jan_key()).is_none());
    }

    #[test]
    fn put_then_exact_get() {
        let cache = RangeCache::in_memory().unwrap();
        let df = daily_frame(d(2024, 1, 1), 31);
        let key = jan_key();

        cache.put(&key, &df);
        let hit = cache.get(&key).expect("exact range should hit");
        assert_eq!(hit.height(), 31);
    }

    #[test]
    fn contained_subrange_hits_and_is_filtered() {
        let cache = RangeCache::in_memory().unwrap();
        cache.put(&jan_key(), &daily_frame(d(2024, 1, 1), 31));

        let narrower = CacheKey::new("bloomberg", "SPX Index", d(2024, 1, 10), d(2024, 1, 20))
            .with_field("PX_LAST");
        let hit = cache.get(&narrower).expect("contained range should hit");
        assert_eq!(hit.height(), 11);

        let dates = column_dates(&hit).unwrap();
        assert_eq!(dates.first(), Some(&d(2024, 1, 10)));
        assert_eq!(dates.last(), Some(&d(2024, 1, 20)));
    }

    #[test]
    fn uncontained_range_misses() {
        let cache = RangeCache::in_memory().unwrap();
        cache.put(&jan_key(), &daily_frame(d(2024, 1, 1), 31));

        // Overlapping but not contained.
        let wider = CacheKey::new("bloomberg", "SPX Index", d(2024, 1, 15), d(2024, 2, 15))
            .with_field("PX_LAST");
        assert!(cache.get(&wider).is_none());

        // Strict superset of the stored range.
        let superset = CacheKey::new("bloomberg", "SPX Index", d(2023, 12, 1), d(2024, 2, 29))
            .with_field("PX_LAST");
        assert!(cache.get(&superset).is_none());
    }

    #[test]
    fn null_key_components_never_match_values() {
        let cache = RangeCache::in_memory().unwrap();
        let df = daily_frame(d(2024, 1, 1), 5);
        let start = d(2024, 1, 1);
        let end = d(2024, 1, 5);

        let bare = CacheKey::new("src", "sym", start, end);
        let with_field = CacheKey::new("src", "sym", start, end).with_field("F");
        let with_path = CacheKey::new("src", "sym", start, end).with_path("/p");
        let with_both = CacheKey::new("src", "sym", start, end)
            .with_field("F")
            .with_path("/p");

        cache.put(&bare, &df);

        assert!(cache.get(&bare).is_some());
        assert!(cache.get(&with_field).is_none());
        assert!(cache.get(&with_path).is_none());
        assert!(cache.get(&with_both).is_none());

        // And the other direction: a stored field never matches a None probe.
        let cache = RangeCache::in_memory().unwrap();
        cache.put(&with_field, &df);
        assert!(cache.get(&with_field).is_some());
        assert!(cache.get(&bare).is_none());
        assert!(cache.get(&with_both).is_none());
    }

    #[test]
    fn put_overwrites_same_key() {
        let cache = RangeCache::in_memory().unwrap();
        let key = jan_key();

        cache.put(&key, &daily_frame(d(2024, 1, 1), 31));
        let second = frame_from_series(
            "value",
            &[d(2024, 1, 1), d(2024, 1, 2)],
            &[Some(100.0), Some(200.0)],
        )
        .unwrap();
        cache.put(&key, &second);

        assert_eq!(cache.list_entries().unwrap().len(), 1);
        let hit = cache.get(&key).unwrap();
        assert_eq!(hit.height(), 2);
        assert_eq!(
            column_values(&hit, "value").unwrap(),
            vec![Some(100.0), Some(200.0)]
        );
    }

    #[test]
    fn narrowest_containing_range_wins() {
        let cache = RangeCache::in_memory().unwrap();
        let wide = CacheKey::new("src", "sym", d(2024, 1, 1), d(2024, 12, 31));
        let narrow = CacheKey::new("src", "sym", d(2024, 1, 1), d(2024, 3, 31));

        cache.put(&wide, &daily_frame(d(2024, 1, 1), 366));
        let narrow_df = frame_from_series("value", &[d(2024, 2, 1)], &[Some(42.0)]).unwrap();
        cache.put(&narrow, &narrow_df);

        let probe = CacheKey::new("src", "sym", d(2024, 2, 1), d(2024, 2, 1));
        let hit = cache.get(&probe).unwrap();
        assert_eq!(column_values(&hit, "value").unwrap(), vec![Some(42.0)]);
    }

    #[test]
    fn clear_scoping() {
        let cache = RangeCache::in_memory().unwrap();
        let df = daily_frame(d(2024, 1, 1), 5);
        let start = d(2024, 1, 1);
        let end = d(2024, 1, 5);

        let pa = CacheKey::new("p", "A", start, end);
        let pb = CacheKey::new("p", "B", start, end);
        let qa = CacheKey::new("q", "A", start, end);
        cache.put(&pa, &df);
        cache.put(&pb, &df);
        cache.put(&qa, &df);

        cache.clear(Some("p"), None).unwrap();

        assert!(cache.get(&pa).is_none());
        assert!(cache.get(&pb).is_none());
        assert!(cache.get(&qa).is_some());
    }

    #[test]
    fn clear_source_and_symbol_pair() {
        let cache = RangeCache::in_memory().unwrap();
        let df = daily_frame(d(2024, 1, 1), 5);
        let start = d(2024, 1, 1);
        let end = d(2024, 1, 5);

        let a_field = CacheKey::new("p", "A", start, end).with_field("X");
        let a_bare = CacheKey::new("p", "A", start, end);
        let b = CacheKey::new("p", "B", start, end);
        cache.put(&a_field, &df);
        cache.put(&a_bare, &df);
        cache.put(&b, &df);

        cache.clear(Some("p"), Some("A")).unwrap();

        assert!(cache.get(&a_field).is_none());
        assert!(cache.get(&a_bare).is_none());
        assert!(cache.get(&b).is_some());
    }

    #[test]
    fn clear_all() {
        let cache = RangeCache::in_memory().unwrap();
        let df = daily_frame(d(2024, 1, 1), 5);
        cache.put(&CacheKey::new("p", "A", d(2024, 1, 1), d(2024, 1, 5)), &df);
        cache.put(&CacheKey::new("q", "B", d(2024, 1, 1), d(2024, 1, 5)), &df);

        cache.clear(None, None).unwrap();
        assert!(cache.list_entries().unwrap().is_empty());
    }

    #[test]
    fn clear_symbol_without_source_is_rejected() {
        let cache = RangeCache::in_memory().unwrap();
        let err = cache.clear(None, Some("A")).unwrap_err();
        assert!(matches!(err, SeriesError::InvalidRequest(_)));
    }

    #[test]
    fn clear_symbol_counts_and_is_idempotent() {
        let cache = RangeCache::in_memory().unwrap();
        let df = daily_frame(d(2024, 1, 1), 5);

        // Two ranges under the same composite prefix, one under another field.
        cache.put(
            &CacheKey::new("p", "A", d(2024, 1, 1), d(2024, 1, 5)).with_field("X"),
            &df,
        );
        cache.put(
            &CacheKey::new("p", "A", d(2024, 2, 1), d(2024, 2, 5)).with_field("X"),
            &df,
        );
        cache.put(
            &CacheKey::new("p", "A", d(2024, 1, 1), d(2024, 1, 5)).with_field("Y"),
            &df,
        );

        let removed = cache.clear_symbol("p", "A", Some("X"), None).unwrap();
        assert_eq!(removed, 2);
        let removed_again = cache.clear_symbol("p", "A", Some("X"), None).unwrap();
        assert_eq!(removed_again, 0);

        // The other field is untouched.
        assert!(
            cache
                .get(&CacheKey::new("p", "A", d(2024, 1, 1), d(2024, 1, 5)).with_field("Y"))
                .is_some()
        );
    }

    #[test]
    fn list_entries_reports_keys() {
        let cache = RangeCache::in_memory().unwrap();
        let df = daily_frame(d(2024, 1, 1), 5);
        cache.put(
            &CacheKey::new("bloomberg", "SPX Index", d(2024, 1, 1), d(2024, 1, 5))
                .with_field("PX_LAST"),
            &df,
        );
        cache.put(
            &CacheKey::new("macrobond", "usgdp", d(2024, 1, 1), d(2024, 1, 5)),
            &df,
        );

        let entries = cache.list_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, "bloomberg");
        assert_eq!(entries[0].field.as_deref(), Some("PX_LAST"));
        assert_eq!(entries[1].source, "macrobond");
        assert!(entries[1].field.is_none());
        assert_eq!(entries[1].start, d(2024, 1, 1));
    }

    #[test]
    fn disabled_cache_is_inert_and_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never_created.db");

        let cache = RangeCache::disabled();
        assert!(!cache.is_enabled());

        let key = CacheKey::new("p", "A", d(2024, 1, 1), d(2024, 1, 5));
        cache.put(&key, &daily_frame(d(2024, 1, 1), 5));
        assert!(cache.get(&key).is_none());
        assert!(cache.list_entries().unwrap().is_empty());
        assert_eq!(cache.clear_symbol("p", "A", None, None).unwrap(), 0);
        cache.clear(None, None).unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn close_is_idempotent_and_degrades_to_miss() {
        let cache = RangeCache::in_memory().unwrap();
        let key = CacheKey::new("p", "A", d(2024, 1, 1), d(2024, 1, 5));
        cache.put(&key, &daily_frame(d(2024, 1, 1), 5));

        cache.close();
        cache.close();

        assert!(cache.get(&key).is_none());
        cache.put(&key, &daily_frame(d(2024, 1, 1), 5));
        assert!(cache.list_entries().unwrap().is_empty());
    }

    #[test]
    fn reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let key = jan_key();

        {
            let cache = RangeCache::open(&path).unwrap();
            cache.put(&key, &daily_frame(d(2024, 1, 1), 31));
            cache.close();
        }

        let cache = RangeCache::open(&path).unwrap();
        let hit = cache.get(&key).expect("persisted entry should hit");
        assert_eq!(hit.height(), 31);
    }

    #[test]
    fn old_schema_is_dropped_and_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute(
                "CREATE TABLE cache_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    source TEXT NOT NULL,
                    symbol TEXT NOT NULL,
                    field TEXT,
                    start_date TEXT NOT NULL,
                    end_date TEXT NOT NULL
                )",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO cache_entries (source, symbol, field, start_date, end_date)
                 VALUES ('old', 'OLD', NULL, '2020-01-01', '2020-12-31')",
                [],
            )
            .unwrap();
        }

        let cache = RangeCache::open(&path).unwrap();
        // The old row is gone, and the new schema is functional.
        assert!(cache.list_entries().unwrap().is_empty());
        let key = jan_key();
        cache.put(&key, &daily_frame(d(2024, 1, 1), 31));
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn corrupt_blob_degrades_to_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let key = jan_key();

        let cache = RangeCache::open(&path).unwrap();
        cache.put(&key, &daily_frame(d(2024, 1, 1), 31));

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("UPDATE cache_data SET data = X'00'", []).unwrap();
        }

        assert!(cache.get(&key).is_none());
    }
}
