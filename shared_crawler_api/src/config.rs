//! Crawl configuration
//!
//! Reads the whitespace separated `key value` format:
//!
//! ```text
//! crawlDelay 1000
//! maxThreads 10
//! depthLimit 2
//! pagesLimit 10
//! linkedSitesLimit 10
//! startUrls 2 http://example.com http://example.org
//! ```

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing value for `{0}`")]
    MissingValue(String),
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
    #[error("`startUrls` announced {expected} urls but only {found} were given")]
    MissingStartUrls { expected: usize, found: usize },
    #[error("`maxThreads` must be at least 1")]
    NoWorkers,
    #[error("no start urls configured")]
    NoStartUrls,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub crawl_delay_ms: u64,
    pub max_threads: usize,
    pub depth_limit: usize,
    /// `None` means no per-host page limit
    pub pages_limit: Option<usize>,
    pub linked_sites_limit: usize,
    pub start_urls: Vec<String>,
    pub port: u16,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        CrawlConfig {
            crawl_delay_ms: 1000,
            max_threads: 10,
            depth_limit: 10,
            pages_limit: Some(10),
            linked_sites_limit: 10,
            start_urls: Vec::new(),
            port: 80,
            connect_timeout_ms: Some(10_000),
            read_timeout_ms: Some(30_000),
        }
    }
}

impl CrawlConfig {
    /// Parse the text format. Unknown keys are skipped along with their value.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = CrawlConfig::default();
        let mut tokens = text.split_whitespace();

        while let Some(key) = tokens.next() {
            let value = tokens
                .next()
                .ok_or_else(|| ConfigError::MissingValue(key.to_string()))?;

            match key {
                "crawlDelay" => config.crawl_delay_ms = parse_value(key, value)?,
                "maxThreads" => config.max_threads = parse_value(key, value)?,
                "depthLimit" => config.depth_limit = parse_value(key, value)?,
                "pagesLimit" => config.pages_limit = parse_limit(key, value)?,
                "linkedSitesLimit" => config.linked_sites_limit = parse_value(key, value)?,
                "port" => config.port = parse_value(key, value)?,
                "connectTimeout" => config.connect_timeout_ms = parse_limit(key, value)?,
                "readTimeout" => config.read_timeout_ms = parse_limit(key, value)?,
                "startUrls" => {
                    let expected: usize = parse_value(key, value)?;
                    let urls: Vec<String> =
                        tokens.by_ref().take(expected).map(str::to_string).collect();
                    if urls.len() < expected {
                        return Err(ConfigError::MissingStartUrls {
                            expected,
                            found: urls.len(),
                        });
                    }
                    config.start_urls.extend(urls);
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.start_urls.is_empty() {
            return Err(ConfigError::NoStartUrls);
        }
        Ok(())
    }

    pub fn crawl_delay(&self) -> Duration {
        Duration::from_millis(self.crawl_delay_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Negative numbers switch the limit off
fn parse_limit<T: FromStr>(key: &str, value: &str) -> Result<Option<T>, ConfigError> {
    let raw: i64 = parse_value(key, value)?;
    if raw < 0 {
        return Ok(None);
    }
    parse_value(key, value).map(Some)
}
