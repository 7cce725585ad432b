//! Error types
//!
//! Configuration errors are fatal and surface at construction time. Record
//! and fetch errors are per-item: the crawl logs them and moves on.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Invalid or incomplete scraper configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("selector map missing")]
    MissingSelectorMap,

    #[error("{0} missing from selector map")]
    MissingSelector(String),

    #[error("invalid selector for '{field}': {message}")]
    InvalidSelector { field: String, message: String },

    #[error("invalid regex for '{field}': {source}")]
    InvalidRegex {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("malformed selector map entry '{field}': {message}")]
    MalformedEntry { field: String, message: String },

    #[error("start_urls missing")]
    MissingStartUrls,

    #[error("failed to parse scraper config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read scraper config: {0}")]
    Io(#[from] std::io::Error),
}

/// Date text that no known layout could parse
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not parse date from '{0}'")]
pub struct DateParseError(pub String);

/// Failure while building a single record
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{field}: {source}")]
    Date {
        field: &'static str,
        #[source]
        source: DateParseError,
    },
}

/// Failure in the fetch layer
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("failed to read body of {url}: {message}")]
    Body { url: String, message: String },

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
}

/// Top-level error wrapper
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
