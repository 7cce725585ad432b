//! Fetched page handed to the extractor
//!
//! The HTML tree and the JSON value are parsed on first use and cached.

use once_cell::unsync::OnceCell;
use scraper::Html;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct Response {
    pub url: String,
    pub status: u16,
    /// Header names are stored lowercased
    pub headers: BTreeMap<String, String>,
    pub body: String,
    html: OnceCell<Html>,
    json: OnceCell<Option<Value>>,
}

impl Response {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
            html: OnceCell::new(),
            json: OnceCell::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parsed HTML document
    pub fn html(&self) -> &Html {
        self.html.get_or_init(|| Html::parse_document(&self.body))
    }

    /// Body parsed as JSON, `None` when it is not valid JSON
    pub fn json(&self) -> Option<&Value> {
        self.json
            .get_or_init(|| match serde_json::from_str(&self.body) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::debug!("{} is not JSON: {}", self.url, e);
                    None
                }
            })
            .as_ref()
    }
}
