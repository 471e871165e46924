#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/metaseries/metaseries/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Local file source adapter for CSV and Parquet files.

use async_trait::async_trait;
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

use metaseries_core::error::{Result, SeriesError};
use metaseries_core::frame;
use metaseries_core::source::{FetchOptions, Source};
use metaseries_core::types::FetchRequest;

/// Registry name of this source.
pub const SOURCE_NAME: &str = "localfile";

/// Source adapter for reading local CSV and Parquet files.
///
/// All requests in a batch must reference the same file path. The `symbol`
/// of a request is the column name to extract; `field` is ignored, so
/// returned columns carry bare symbol names.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileSource;

impl LocalFileSource {
    /// Creates the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn read_file(path: &Path) -> Result<DataFrame> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => {
                debug!(path = %path.display(), "reading csv");
                CsvReadOptions::default()
                    .try_into_reader_with_file_path(Some(path.to_path_buf()))
                    .map_err(|e| SeriesError::Fetch(e.to_string()))?
                    .finish()
                    .map_err(|e| SeriesError::Fetch(e.to_string()))
            }
            "parquet" => {
                debug!(path = %path.display(), "reading parquet");
                let file =
                    File::open(path).map_err(|e| SeriesError::Fetch(e.to_string()))?;
                ParquetReader::new(file)
                    .finish()
                    .map_err(|e| SeriesError::Fetch(e.to_string()))
            }
            other => Err(SeriesError::Fetch(format!(
                "unsupported file extension: {other:?}"
            ))),
        }
    }
}

#[async_trait]
impl Source for LocalFileSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(
        &self,
        requests: &[FetchRequest],
        start: NaiveDate,
        end: NaiveDate,
        _options: &FetchOptions,
    ) -> Result<DataFrame> {
        if requests.is_empty() {
            return Ok(DataFrame::empty());
        }

        let paths: BTreeSet<Option<&str>> =
            requests.iter().map(|r| r.path.as_deref()).collect();
        if paths.contains(&None) {
            warn!("fetch failed: path not provided");
            return Err(SeriesError::InvalidRequest(
                "path is required for the localfile source".to_string(),
            ));
        }
        if paths.len() > 1 {
            warn!("fetch failed: requests reference different paths");
            return Err(SeriesError::InvalidRequest(
                "all requests in a localfile batch must reference the same path".to_string(),
            ));
        }

        let path_str = requests[0].path.as_deref().unwrap_or_default();
        let path = Path::new(path_str);
        let symbols: Vec<&str> = requests.iter().map(|r| r.symbol.as_str()).collect();

        debug!(
            path = %path.display(),
            symbols = ?symbols,
            %start,
            %end,
            "fetch start"
        );

        if !path.exists() {
            return Err(SeriesError::Fetch(format!(
                "file not found: {}",
                path.display()
            )));
        }

        let df = Self::read_file(path)?;
        if df.height() == 0 {
            return Err(SeriesError::NoData {
                symbol: symbols.join(","),
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let df = frame::normalize_frame(&df)?;

        let available: Vec<String> = frame::value_column_names(&df);
        let missing: Vec<&str> = symbols
            .iter()
            .filter(|s| !available.iter().any(|a| a == *s))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(SeriesError::Fetch(format!(
                "column(s) {} not found in {}. Available: {}",
                missing.join(", "),
                path.display(),
                available.join(", ")
            )));
        }

        let mut selection = vec!["date"];
        selection.extend(symbols.iter().copied());
        let df = df
            .select(selection)
            .map_err(|e| SeriesError::Fetch(e.to_string()))?;

        let filtered = frame::filter_range(&df, start, end)?;
        if filtered.height() == 0 {
            return Err(SeriesError::NoData {
                symbol: symbols.join(","),
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        debug!(
            path = %path.display(),
            rows = filtered.height(),
            "fetch complete"
        );
        Ok(filtered)
    }

    async fn metadata(&self, symbol: &str) -> Result<BTreeMap<String, String>> {
        let path = Path::new(symbol);
        debug!(path = %path.display(), "get metadata");

        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), SOURCE_NAME.to_string());
        metadata.insert("path".to_string(), symbol.to_string());
        metadata.insert(
            "filename".to_string(),
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string(),
        );
        metadata.insert(
            "extension".to_string(),
            path.extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default(),
        );

        match std::fs::metadata(path) {
            Ok(meta) => {
                metadata.insert("exists".to_string(), "true".to_string());
                metadata.insert("size_bytes".to_string(), meta.len().to_string());
            }
            Err(_) => {
                metadata.insert("exists".to_string(), "false".to_string());
            }
        }

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaseries_core::frame::{column_dates, column_values};
    use std::io::Write;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn write_csv(dir: &tempfile::TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn sample_csv(dir: &tempfile::TempDir) -> String {
        write_csv(
            dir,
            "data.csv",
            "date,gdp,cpi\n\
             2024-01-01,100.0,1.5\n\
             2024-01-02,101.0,1.6\n\
             2024-01-03,102.0,1.7\n",
        )
    }

    #[tokio::test]
    async fn fetch_two_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_csv(&dir);
        let source = LocalFileSource::new();

        let requests = vec![
            FetchRequest::new("gdp").with_path(path.as_str()),
            FetchRequest::new("cpi").with_path(path.as_str()),
        ];
        let df = source
            .fetch(&requests, d(2024, 1, 1), d(2024, 1, 3), &FetchOptions::new())
            .await
            .unwrap();

        assert_eq!(df.height(), 3);
        assert_eq!(
            df.get_column_names()
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
            vec!["date", "gdp", "cpi"]
        );
        assert_eq!(
            column_values(&df, "gdp").unwrap(),
            vec![Some(100.0), Some(101.0), Some(102.0)]
        );
    }

    #[tokio::test]
    async fn fetch_filters_date_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_csv(&dir);
        let source = LocalFileSource::new();

        let requests = vec![FetchRequest::new("gdp").with_path(path.as_str())];
        let df = source
            .fetch(&requests, d(2024, 1, 2), d(2024, 1, 2), &FetchOptions::new())
            .await
            .unwrap();

        assert_eq!(df.height(), 1);
        assert_eq!(column_dates(&df).unwrap(), vec![d(2024, 1, 2)]);
    }

    #[tokio::test]
    async fn missing_path_is_invalid() {
        let source = LocalFileSource::new();
        let requests = vec![FetchRequest::new("gdp")];
        let err = source
            .fetch(&requests, d(2024, 1, 1), d(2024, 1, 3), &FetchOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SeriesError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn mixed_paths_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = sample_csv(&dir);
        let path_b = write_csv(&dir, "other.csv", "date,x\n2024-01-01,1\n");
        let source = LocalFileSource::new();

        let requests = vec![
            FetchRequest::new("gdp").with_path(path_a.as_str()),
            FetchRequest::new("x").with_path(path_b.as_str()),
        ];
        let err = source
            .fetch(&requests, d(2024, 1, 1), d(2024, 1, 3), &FetchOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SeriesError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn missing_file_is_fetch_error() {
        let source = LocalFileSource::new();
        let requests = vec![FetchRequest::new("gdp").with_path("/no/such/file.csv")];
        let err = source
            .fetch(&requests, d(2024, 1, 1), d(2024, 1, 3), &FetchOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SeriesError::Fetch(_)));
    }

    #[tokio::test]
    async fn missing_column_lists_available() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_csv(&dir);
        let source = LocalFileSource::new();

        let requests = vec![FetchRequest::new("unemployment").with_path(path.as_str())];
        let err = source
            .fetch(&requests, d(2024, 1, 1), d(2024, 1, 3), &FetchOptions::new())
            .await
            .unwrap_err();
        match err {
            SeriesError::Fetch(msg) => {
                assert!(msg.contains("unemployment"));
                assert!(msg.contains("gdp"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_range_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_csv(&dir);
        let source = LocalFileSource::new();

        let requests = vec![FetchRequest::new("gdp").with_path(path.as_str())];
        let err = source
            .fetch(&requests, d(2025, 1, 1), d(2025, 1, 31), &FetchOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SeriesError::NoData { .. }));
    }

    #[tokio::test]
    async fn unsupported_extension_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "data.xlsx", "not really a spreadsheet");
        let source = LocalFileSource::new();

        let requests = vec![FetchRequest::new("gdp").with_path(path.as_str())];
        let err = source
            .fetch(&requests, d(2024, 1, 1), d(2024, 1, 3), &FetchOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SeriesError::Fetch(_)));
    }

    #[tokio::test]
    async fn empty_requests_return_empty_frame() {
        let source = LocalFileSource::new();
        let df = source
            .fetch(&[], d(2024, 1, 1), d(2024, 1, 3), &FetchOptions::new())
            .await
            .unwrap();
        assert_eq!(df.height(), 0);
    }

    #[tokio::test]
    async fn metadata_reports_file_facts() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_csv(&dir);
        let source = LocalFileSource::new();

        let meta = source.metadata(&path).await.unwrap();
        assert_eq!(meta.get("source").map(String::as_str), Some("localfile"));
        assert_eq!(meta.get("extension").map(String::as_str), Some("csv"));
        assert_eq!(meta.get("exists").map(String::as_str), Some("true"));
        assert!(meta.contains_key("size_bytes"));

        let missing = source.metadata("/no/such/file.csv").await.unwrap();
        assert_eq!(missing.get("exists").map(String::as_str), Some("false"));
    }
}
