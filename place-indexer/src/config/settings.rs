//! Settings read from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use place_indexer_repository::opensearch::{DEFAULT_INDEX_ALIAS, DEFAULT_MAX_BATCH_SIZE};
use place_indexer_repository::{GazetteerConfig, IndexConfig};
use place_indexer_shared::{CountryFilter, UpdateMarker};

use crate::loader::{LoaderConfig, RetryPolicy};
use crate::search::DEFAULT_LANGUAGES;
use crate::IndexingError;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_BULK_MAX_RETRIES: u32 = 3;
const DEFAULT_BULK_RETRY_BACKOFF_MS: u64 = 500;
const DEFAULT_BULK_RETRY_MAX_BACKOFF_MS: u64 = 10_000;
const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 60;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection at a fixed interval until successful.
    Retry,
}

impl ConnectionMode {
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "retry".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// What the binary does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Drop and recreate the index, then exit.
    RecreateIndex,
    /// Full import, then exit.
    Import,
    /// One update cycle, then exit.
    Update,
    /// Update cycles at a fixed interval until Ctrl-C.
    UpdateLoop,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "recreate-index" => Ok(Self::RecreateIndex),
            "import" => Ok(Self::Import),
            "update" => Ok(Self::Update),
            "update-loop" => Ok(Self::UpdateLoop),
            other => Err(format!(
                "Unknown mode '{}'; expected recreate-index, import, update or update-loop",
                other
            )),
        }
    }
}

/// All settings of the indexer.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: RunMode,
    pub gazetteer: GazetteerConfig,
    pub countries: CountryFilter,
    pub opensearch_url: String,
    pub index: IndexConfig,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
    pub loader: LoaderConfig,
    pub update_interval: Duration,
    pub start_marker: Option<UpdateMarker>,
    pub languages: Vec<String>,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `PLACE_INDEXER_MODE`: recreate-index, import, update or update-loop (default: update-loop)
    /// - `GAZETTEER_HOST`, `GAZETTEER_PORT`, `GAZETTEER_DATABASE`, `GAZETTEER_USER`,
    ///   `GAZETTEER_PASSWORD`, `GAZETTEER_MAX_CONNECTIONS`: gazetteer database
    /// - `COUNTRY_CODES`: comma separated country codes for the full import (default: all)
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `INDEX_ALIAS`: Index alias name (default: "places")
    /// - `INDEX_VERSION`: Index version number (default: 0)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - `IMPORT_BATCH_SIZE`: rows per batch (default: 1000, at most 5000 per bulk request)
    /// - `BULK_MAX_RETRIES`, `BULK_RETRY_BACKOFF_MS`, `BULK_RETRY_MAX_BACKOFF_MS`: bulk retries
    /// - `UPDATE_INTERVAL_SECS`: update loop period (default: 60)
    /// - `UPDATE_START_MARKER`: marker used when the index stores none
    /// - `LANGUAGES`: comma separated query languages (default: default,en,de,fr,it)
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = match lookup("PLACE_INDEXER_MODE") {
            Some(value) => value.parse::<RunMode>().map_err(IndexingError::config)?,
            None => RunMode::UpdateLoop,
        };

        let defaults = GazetteerConfig::default();
        let gazetteer = GazetteerConfig {
            host: lookup("GAZETTEER_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "GAZETTEER_PORT", defaults.port),
            database: lookup("GAZETTEER_DATABASE").unwrap_or(defaults.database),
            user: lookup("GAZETTEER_USER").unwrap_or(defaults.user),
            password: lookup("GAZETTEER_PASSWORD").unwrap_or(defaults.password),
            max_connections: parse_or(
                &lookup,
                "GAZETTEER_MAX_CONNECTIONS",
                defaults.max_connections,
            ),
        };

        let countries = match lookup("COUNTRY_CODES") {
            Some(list) => CountryFilter::parse(&list)
                .map_err(|e| IndexingError::config(format!("Invalid COUNTRY_CODES: {}", e)))?,
            None => CountryFilter::all(),
        };

        let index = IndexConfig::new(
            lookup("INDEX_ALIAS").unwrap_or_else(|| DEFAULT_INDEX_ALIAS.to_string()),
            parse_or(&lookup, "INDEX_VERSION", 0u32),
        );

        let retry = RetryPolicy {
            max_retries: parse_or(&lookup, "BULK_MAX_RETRIES", DEFAULT_BULK_MAX_RETRIES),
            initial_backoff: Duration::from_millis(parse_or(
                &lookup,
                "BULK_RETRY_BACKOFF_MS",
                DEFAULT_BULK_RETRY_BACKOFF_MS,
            )),
            max_backoff: Duration::from_millis(parse_or(
                &lookup,
                "BULK_RETRY_MAX_BACKOFF_MS",
                DEFAULT_BULK_RETRY_MAX_BACKOFF_MS,
            )),
        };

        let batch_size = match parse_or(&lookup, "IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE) {
            0 => {
                warn!(default = DEFAULT_BATCH_SIZE, "IMPORT_BATCH_SIZE must be positive, using default");
                DEFAULT_BATCH_SIZE
            }
            size if size > DEFAULT_MAX_BATCH_SIZE => {
                warn!(
                    value = size,
                    max = DEFAULT_MAX_BATCH_SIZE,
                    "IMPORT_BATCH_SIZE exceeds the bulk request limit, capping"
                );
                DEFAULT_MAX_BATCH_SIZE
            }
            size => size,
        };

        let update_interval = match parse_or(&lookup, "UPDATE_INTERVAL_SECS", DEFAULT_UPDATE_INTERVAL_SECS) {
            0 => {
                warn!(
                    default = DEFAULT_UPDATE_INTERVAL_SECS,
                    "UPDATE_INTERVAL_SECS must be positive, using default"
                );
                DEFAULT_UPDATE_INTERVAL_SECS
            }
            secs => secs,
        };

        let start_marker = lookup("UPDATE_START_MARKER").and_then(|value| {
            match value.trim().parse::<i64>() {
                Ok(seq) => Some(UpdateMarker(seq)),
                Err(_) => {
                    warn!(value = %value, "Invalid UPDATE_START_MARKER, ignoring");
                    None
                }
            }
        });

        let languages = lookup("LANGUAGES")
            .map(|list| {
                list.split(',')
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|langs| !langs.is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGES.iter().map(|l| l.to_string()).collect());

        Ok(Self {
            mode,
            gazetteer,
            countries,
            opensearch_url: lookup("OPENSEARCH_URL")
                .unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()),
            index,
            connection_mode: ConnectionMode::parse(lookup("OPENSEARCH_CONNECTION_MODE")),
            retry_interval: Duration::from_secs(parse_or(
                &lookup,
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )),
            loader: LoaderConfig { batch_size, retry },
            update_interval: Duration::from_secs(update_interval),
            start_marker,
            languages,
        })
    }
}

/// Parse `key`, falling back to `default` with a warning when the value is invalid.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy,
{
    match lookup(key) {
        Some(value) => value.trim().parse::<T>().unwrap_or_else(|_| {
            warn!(key, value = %value, default = %default, "Invalid value, using default");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, IndexingError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();

        assert_eq!(s.mode, RunMode::UpdateLoop);
        assert_eq!(s.gazetteer, GazetteerConfig::default());
        assert!(s.countries.is_empty());
        assert_eq!(s.opensearch_url, "http://localhost:9200");
        assert_eq!(s.index.versioned_index_name(), "places_v0");
        assert_eq!(s.connection_mode, ConnectionMode::Retry);
        assert_eq!(s.retry_interval, Duration::from_secs(15));
        assert_eq!(s.loader.batch_size, 1000);
        assert_eq!(s.loader.retry, RetryPolicy::default());
        assert_eq!(s.update_interval, Duration::from_secs(60));
        assert_eq!(s.start_marker, None);
        assert_eq!(s.languages, vec!["default", "en", "de", "fr", "it"]);
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("PLACE_INDEXER_MODE", "import"),
            ("GAZETTEER_HOST", "db"),
            ("GAZETTEER_PORT", "6432"),
            ("COUNTRY_CODES", "de, CH"),
            ("INDEX_ALIAS", "geo"),
            ("INDEX_VERSION", "3"),
            ("OPENSEARCH_CONNECTION_MODE", "FAIL-FAST"),
            ("IMPORT_BATCH_SIZE", "250"),
            ("UPDATE_START_MARKER", "42"),
            ("LANGUAGES", "en, de"),
        ])
        .unwrap();

        assert_eq!(s.mode, RunMode::Import);
        assert_eq!(s.gazetteer.host, "db");
        assert_eq!(s.gazetteer.port, 6432);
        assert!(s.countries.matches(Some("ch")));
        assert!(!s.countries.matches(Some("fr")));
        assert_eq!(s.index.versioned_index_name(), "geo_v3");
        assert_eq!(s.connection_mode, ConnectionMode::FailFast);
        assert_eq!(s.loader.batch_size, 250);
        assert_eq!(s.start_marker, Some(UpdateMarker(42)));
        assert_eq!(s.languages, vec!["en", "de"]);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let s = settings(&[
            ("GAZETTEER_PORT", "not-a-port"),
            ("IMPORT_BATCH_SIZE", "0"),
            ("UPDATE_INTERVAL_SECS", "-5"),
            ("UPDATE_START_MARKER", "yesterday"),
        ])
        .unwrap();

        assert_eq!(s.gazetteer.port, 5432);
        assert_eq!(s.loader.batch_size, 1000);
        assert_eq!(s.update_interval, Duration::from_secs(60));
        assert_eq!(s.start_marker, None);
    }

    #[test]
    fn test_batch_size_is_capped_at_bulk_limit() {
        let s = settings(&[("IMPORT_BATCH_SIZE", "6000")]).unwrap();
        assert_eq!(s.loader.batch_size, DEFAULT_MAX_BATCH_SIZE);

        let s = settings(&[("IMPORT_BATCH_SIZE", "5000")]).unwrap();
        assert_eq!(s.loader.batch_size, 5000);
    }

    #[test]
    fn test_unknown_mode_is_an_error() {
        let err = settings(&[("PLACE_INDEXER_MODE", "dump")]).unwrap_err();
        assert!(err.to_string().contains("Unknown mode 'dump'"));
    }

    #[test]
    fn test_invalid_country_codes_are_an_error() {
        assert!(settings(&[("COUNTRY_CODES", "germany")]).is_err());
    }
}
