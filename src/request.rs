//! Requests and parse outputs
//!
//! A `Request` carries everything the next callback needs: page number,
//! caller overrides and the connection context (headers, cookies, proxy).

use std::collections::BTreeMap;

use crate::config::CrawlSettings;
use crate::pagination::PaginationState;
use crate::records::{Overrides, Record, RecordKind};

/// Which parse step handles the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Listing,
    Detail(RecordKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub url: String,
    pub callback: Callback,
    /// Listing page counter; detail requests inherit the page they came from
    pub pagination: PaginationState,
    /// Field values known before the detail page is fetched
    pub overrides: Overrides,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub proxy: Option<String>,
}

impl Request {
    /// Listing request with the connection context from `settings`
    pub fn listing(url: impl Into<String>, settings: &CrawlSettings) -> Self {
        Self {
            url: url.into(),
            callback: Callback::Listing,
            pagination: PaginationState::new(settings.page, settings.limit_pages),
            overrides: Overrides::default(),
            headers: settings.headers.clone(),
            cookies: settings.cookies.clone(),
            proxy: settings.proxy.clone(),
        }
    }

    pub fn page(&self) -> u32 {
        self.pagination.page
    }

    /// Same context, different target
    pub fn follow(&self, url: impl Into<String>, callback: Callback) -> Self {
        Self {
            url: url.into(),
            callback,
            ..self.clone()
        }
    }

    pub fn with_pagination(mut self, pagination: PaginationState) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// `Cookie` header value, `None` without cookies
    pub fn cookie_header(&self) -> Option<String> {
        cookie_header(&self.cookies)
    }
}

/// Joins cookies into one `Cookie` header value
pub fn cookie_header(cookies: &BTreeMap<String, String>) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// One thing a parse step produced
#[derive(Debug)]
pub enum Output {
    /// Accepted record, ready for submission
    Record(Record),
    /// Debug mode: shown, never submitted
    Inspect(Record),
    Request(Request),
}

pub type ParseOutput = Vec<Output>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PageLimit;

    #[test]
    fn test_listing_carries_settings() {
        let mut settings = CrawlSettings::default();
        settings.page = 3;
        settings.limit_pages = PageLimit::Unbounded;
        settings.proxy = Some("http://proxy.local:8080".to_string());
        settings.cookies.insert("age_verified".to_string(), "1".to_string());
        settings.cookies.insert("lang".to_string(), "en".to_string());

        let request = Request::listing("https://example.com/videos", &settings);
        assert_eq!(request.callback, Callback::Listing);
        assert_eq!(request.page(), 3);
        assert_eq!(request.cookie_header().as_deref(), Some("age_verified=1; lang=en"));

        let detail = request.follow(
            "https://example.com/scene/1",
            Callback::Detail(RecordKind::Scene),
        );
        assert_eq!(detail.page(), 3);
        assert_eq!(detail.proxy.as_deref(), Some("http://proxy.local:8080"));
        assert_eq!(detail.cookies, request.cookies);
    }
}
