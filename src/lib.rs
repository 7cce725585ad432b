//! Configurable scraping core for adult-content metadata sites
//!
//! Turns fetched pages into typed Scene, Movie and Performer records:
//! - selector maps in three dialects (CSS, XPath, JSON path)
//! - refinement regexes and text/date/link normalization
//! - image blobs, date filtering and listing pagination
//! - a blocking crawl driver and a C ABI for embedding

pub mod builder;
pub mod config;
pub mod crawl;
pub mod date_filter;
pub mod dates;
pub mod error;
pub mod extractors;
pub mod ffi;
pub mod field;
pub mod images;
pub mod links;
pub mod normalize;
pub mod pagination;
pub mod records;
pub mod request;
pub mod response;
pub mod selector_map;
pub mod site;

pub use builder::RecordBuilder;
pub use config::{CrawlSettings, DatePolicy, ImageSettings, ScraperConfig};
pub use crawl::{Crawl, CrawlEvent, Fetcher, HttpFetcher};
pub use date_filter::{DateFilter, Verdict};
pub use error::{ConfigError, Error, FetchError, RecordError, Result};
pub use ffi::*;
pub use records::{Movie, Overrides, Performer, Record, RecordKind, Scene};
pub use request::{Callback, Output, ParseOutput, Request};
pub use response::Response;
pub use selector_map::CompiledSelectorMap;
pub use site::{LinkListing, ListingContext, ListingItem, ListingParser, SiteScraper};
