//! Scraper configuration
//!
//! One immutable `ScraperConfig` is built per scraper instance and passed
//! down the call chain. It is usually deserialized from JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;
use crate::pagination::PageLimit;
use crate::records::Overrides;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Per-site scraper definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Scraper name, used in log lines
    #[serde(default)]
    pub name: String,
    /// Listing URLs the crawl starts from
    #[serde(default)]
    pub start_urls: Vec<String>,
    /// Field name -> selector / refinement entries
    #[serde(default)]
    pub selector_map: Option<Map<String, Value>>,
    /// Hardcoded field values (e.g. `network`), applied after overrides
    #[serde(default)]
    pub static_fields: Overrides,
    /// Lowercased tag -> canonical tag
    #[serde(default)]
    pub tag_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub settings: CrawlSettings,
}

impl ScraperConfig {
    pub fn new(name: impl Into<String>, selector_map: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            start_urls: Vec::new(),
            selector_map: Some(selector_map),
            static_fields: Overrides::default(),
            tag_aliases: BTreeMap::new(),
            settings: CrawlSettings::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// How to treat date text that cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePolicy {
    /// Log a warning and fall back to today
    #[default]
    Lenient,
    /// Drop the record with a date error
    Strict,
}

/// Image blob retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub enabled: bool,
    pub max_width: u32,
    pub max_height: u32,
    pub timeout_secs: u64,
    /// Responses larger than this are discarded
    pub max_bytes: u64,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_width: 1920,
            max_height: 1080,
            timeout_secs: 30,
            max_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Run settings shared by every request of one scraper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Only emit records newer than this many days
    pub days: u32,
    pub limit_pages: PageLimit,
    /// First page to request
    pub page: u32,
    /// Never drop or submit; surface annotated records instead
    pub debug: bool,
    /// Bypass downstream dedup
    pub force: bool,
    pub force_update: bool,
    pub force_fields: Vec<String>,
    pub user_agent: String,
    /// Page request timeout; image downloads use `images.timeout_secs`
    pub timeout_secs: u64,
    pub proxy: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub date_policy: DatePolicy,
    pub images: ImageSettings,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            days: 9999,
            limit_pages: PageLimit::default(),
            page: 1,
            debug: false,
            force: false,
            force_update: false,
            force_fields: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            proxy: None,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            date_policy: DatePolicy::default(),
            images: ImageSettings::default(),
        }
    }
}

impl CrawlSettings {
    /// Image blobs are skipped on forced updates that don't list `image`
    pub fn fetch_images(&self) -> bool {
        self.images.enabled
            && (!self.force_update || self.force_fields.iter().any(|f| f.trim() == "image"))
    }
}
