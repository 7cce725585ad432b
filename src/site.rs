//! Scraper entry points
//!
//! `SiteScraper` ties one site's configuration to one record kind. Listing
//! responses yield items and possibly a continuation request; detail
//! responses yield at most one record.

use std::collections::HashSet;

use crate::builder::RecordBuilder;
use crate::config::ScraperConfig;
use crate::date_filter::{DateFilter, Verdict};
use crate::error::ConfigError;
use crate::field::{Arity, FieldExtractor};
use crate::images::ImageFetcher;
use crate::links::resolve_link;
use crate::normalize::TagNormalizer;
use crate::pagination::page_url;
use crate::records::{Overrides, Record, RecordKind};
use crate::request::{Callback, Output, ParseOutput, Request};
use crate::response::Response;
use crate::selector_map::CompiledSelectorMap;

/// Something found on a listing page
#[derive(Debug)]
pub enum ListingItem {
    /// Detail page to fetch, with values already known from the listing
    Detail { url: String, overrides: Overrides },
    /// Record built straight from the listing
    Record(Record),
}

/// Site context handed to listing parsers
pub struct ListingContext<'a> {
    pub kind: RecordKind,
    pub config: &'a ScraperConfig,
    pub selector_map: &'a CompiledSelectorMap,
}

/// Finds the items on a listing page
pub trait ListingParser {
    fn items(&self, response: &Response, context: &ListingContext<'_>) -> Vec<ListingItem>;
}

/// Follows every link matched by the kind's listing selector
/// (`scenes`, `movies` or `performers`)
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkListing;

impl ListingParser for LinkListing {
    fn items(&self, response: &Response, context: &ListingContext<'_>) -> Vec<ListingItem> {
        let key = context.kind.listing_key();
        let extractor = FieldExtractor::new(context.selector_map);
        if !extractor.has(key) {
            log::debug!("{}: no '{}' selector, listing yields nothing", context.config.name, key);
            return Vec::new();
        }

        let mut seen = HashSet::new();
        extractor
            .extract(response, key, &Arity::All)
            .into_list()
            .into_iter()
            .map(|link| resolve_link(&response.url, &link))
            .filter(|url| !url.is_empty() && seen.insert(url.clone()))
            .map(|url| ListingItem::Detail {
                url,
                overrides: Overrides::default(),
            })
            .collect()
    }
}

pub struct SiteScraper {
    config: ScraperConfig,
    kind: RecordKind,
    selector_map: CompiledSelectorMap,
    tags: TagNormalizer,
    listing: Box<dyn ListingParser>,
    date_filter: DateFilter,
}

impl std::fmt::Debug for SiteScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteScraper")
            .field("name", &self.config.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl SiteScraper {
    /// Compile the selector map; fails on a missing or invalid map
    pub fn new(config: ScraperConfig, kind: RecordKind) -> Result<Self, ConfigError> {
        let raw = config
            .selector_map
            .as_ref()
            .ok_or(ConfigError::MissingSelectorMap)?;
        let selector_map = CompiledSelectorMap::compile(raw)?;
        let tags = TagNormalizer::new(&config.tag_aliases);
        let date_filter = DateFilter::new(config.settings.days);

        log::info!(
            "{}: {} scraper, days={}, limit_pages={:?}, debug={}",
            config.name,
            kind.as_str(),
            config.settings.days,
            config.settings.limit_pages,
            config.settings.debug
        );

        Ok(Self {
            config,
            kind,
            selector_map,
            tags,
            listing: Box::new(LinkListing),
            date_filter,
        })
    }

    /// Replace the default `LinkListing`
    pub fn with_listing(mut self, listing: impl ListingParser + 'static) -> Self {
        self.listing = Box::new(listing);
        self
    }

    pub fn with_date_filter(mut self, date_filter: DateFilter) -> Self {
        self.date_filter = date_filter;
        self
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn selector_map(&self) -> &CompiledSelectorMap {
        &self.selector_map
    }

    /// One listing request per start URL, at the configured start page
    pub fn start_requests(&self) -> Result<Vec<Request>, ConfigError> {
        let starts: Vec<&String> = self
            .config
            .start_urls
            .iter()
            .filter(|u| !u.trim().is_empty())
            .collect();
        if starts.is_empty() {
            return Err(ConfigError::MissingStartUrls);
        }

        let settings = &self.config.settings;
        Ok(starts
            .into_iter()
            .map(|start| {
                let url = match self.selector_map.pagination() {
                    Some(template) => page_url(start, template, settings.page.max(1)),
                    None => start.clone(),
                };
                Request::listing(url, settings)
            })
            .collect())
    }

    /// Dispatch on the request's callback
    pub fn parse(
        &self,
        response: &Response,
        request: &Request,
        images: Option<&dyn ImageFetcher>,
    ) -> ParseOutput {
        match request.callback {
            Callback::Listing => self.parse_listing(response, request),
            Callback::Detail(kind) => self
                .parse_detail(response, request, kind, images)
                .into_iter()
                .collect(),
        }
    }

    fn parse_listing(&self, response: &Response, request: &Request) -> ParseOutput {
        let context = ListingContext {
            kind: self.kind,
            config: &self.config,
            selector_map: &self.selector_map,
        };
        let items = self.listing.items(response, &context);
        let count = items.len();
        log::debug!(
            "{}: page {} of {} yielded {} item(s)",
            self.config.name,
            request.page(),
            response.url,
            count
        );

        let mut output: ParseOutput = items
            .into_iter()
            .filter_map(|item| match item {
                ListingItem::Detail { url, overrides } => Some(Output::Request(
                    request
                        .follow(url, Callback::Detail(self.kind))
                        .with_overrides(overrides),
                )),
                ListingItem::Record(record) => self.filter(record),
            })
            .collect();

        if let Some(next) = request.pagination.next(count) {
            if let Some(template) = self.selector_map.pagination() {
                log::info!("{}: next page {}", self.config.name, next.page);
                let url = page_url(&response.url, template, next.page);
                output.push(Output::Request(
                    request
                        .follow(url, Callback::Listing)
                        .with_pagination(next)
                        .with_overrides(Overrides::default()),
                ));
            }
        }

        output
    }

    fn parse_detail(
        &self,
        response: &Response,
        request: &Request,
        kind: RecordKind,
        images: Option<&dyn ImageFetcher>,
    ) -> Option<Output> {
        let mut builder = RecordBuilder::new(&self.config, &self.selector_map, &self.tags);
        if let Some(fetcher) = images {
            builder = builder.with_image_fetcher(fetcher);
        }

        match builder.build(response, kind, &request.overrides) {
            Ok(record) => self.filter(record),
            Err(e) => {
                log::error!("{}: dropping {}: {}", self.config.name, response.url, e);
                None
            }
        }
    }

    fn filter(&self, record: Record) -> Option<Output> {
        match self.date_filter.check(record, self.config.settings.debug) {
            Verdict::Accept(record) => Some(Output::Record(record)),
            Verdict::Inspect(record) => Some(Output::Inspect(record)),
            Verdict::Reject(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_filter::FILTERED_REASON;
    use crate::pagination::PageLimit;
    use crate::records::Scene;
    use chrono::NaiveDate;
    use serde_json::json;

    const LISTING: &str = r#"
        <html><body>
            <div class="scene"><a href="/scene/1">One</a></div>
            <div class="scene"><a href="/scene/2">Two</a></div>
            <div class="scene"><a href="https://example.com/scene/1">One again</a></div>
        </body></html>
    "#;

    fn config() -> ScraperConfig {
        let mut config: ScraperConfig = serde_json::from_value(json!({
            "name": "example",
            "start_urls": ["https://example.com"],
            "selector_map": {
                "title": "h1::text",
                "date": "span.date::text",
                "scenes": "//div[@class='scene']/a/@href",
                "pagination": "/videos/page/%s"
            },
            "settings": {"limit_pages": 5, "days": 30}
        }))
        .unwrap();
        config.settings.images.enabled = false;
        config
    }

    fn scraper(config: ScraperConfig) -> SiteScraper {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        SiteScraper::new(config, RecordKind::Scene)
            .unwrap()
            .with_date_filter(DateFilter::with_today(30, today))
    }

    fn requests(output: &ParseOutput) -> Vec<&Request> {
        output
            .iter()
            .filter_map(|o| match o {
                Output::Request(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_requests() {
        let scraper = scraper(config());
        let starts = scraper.start_requests().unwrap();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].url, "https://example.com/videos/page/1");
        assert_eq!(starts[0].page(), 1);
        assert_eq!(starts[0].pagination.limit, PageLimit::Pages(5));
    }

    #[test]
    fn test_configuration_errors() {
        let mut missing_urls = config();
        missing_urls.start_urls.clear();
        assert!(matches!(
            scraper(missing_urls).start_requests(),
            Err(ConfigError::MissingStartUrls)
        ));

        let mut missing_map = config();
        missing_map.selector_map = None;
        assert!(matches!(
            SiteScraper::new(missing_map, RecordKind::Scene),
            Err(ConfigError::MissingSelectorMap)
        ));
    }

    #[test]
    fn test_listing_follows_links_and_paginates() {
        let scraper = scraper(config());
        let start = scraper.start_requests().unwrap().remove(0);
        let response = Response::new(start.url.clone(), LISTING);

        let output = scraper.parse(&response, &start, None);
        let requests = requests(&output);
        assert_eq!(requests.len(), 3);

        assert_eq!(requests[0].url, "https://example.com/scene/1");
        assert_eq!(requests[0].callback, Callback::Detail(RecordKind::Scene));
        assert_eq!(requests[1].url, "https://example.com/scene/2");

        let next = requests[2];
        assert_eq!(next.callback, Callback::Listing);
        assert_eq!(next.url, "https://example.com/videos/page/2");
        assert_eq!(next.page(), 2);
    }

    #[test]
    fn test_empty_listing_stops() {
        let scraper = scraper(config());
        let start = scraper.start_requests().unwrap().remove(0);
        let response = Response::new(start.url.clone(), "<html><body></body></html>");
        assert!(scraper.parse(&response, &start, None).is_empty());
    }

    #[test]
    fn test_detail_date_filter() {
        let scraper = scraper(config());
        let request = scraper
            .start_requests()
            .unwrap()
            .remove(0)
            .follow("https://example.com/scene/1", Callback::Detail(RecordKind::Scene));

        let fresh = Response::new(
            "https://example.com/scene/1",
            r#"<h1>fresh scene</h1><span class="date">2024-06-01</span>"#,
        );
        let output = scraper.parse(&fresh, &request, None);
        assert!(matches!(output.as_slice(), [Output::Record(Record::Scene(s))] if s.title == "Fresh Scene"));

        let stale = Response::new(
            "https://example.com/scene/1",
            r#"<h1>old scene</h1><span class="date">2024-05-01</span>"#,
        );
        assert!(scraper.parse(&stale, &request, None).is_empty());
    }

    #[test]
    fn test_debug_mode_surfaces_filtered_records() {
        let mut config = config();
        config.settings.debug = true;
        let scraper = scraper(config);
        let request = scraper
            .start_requests()
            .unwrap()
            .remove(0)
            .follow("https://example.com/scene/1", Callback::Detail(RecordKind::Scene));
        let stale = Response::new(
            "https://example.com/scene/1",
            r#"<h1>old scene</h1><span class="date">2024-05-01</span>"#,
        );

        let output = scraper.parse(&stale, &request, None);
        let [Output::Inspect(record)] = output.as_slice() else {
            panic!("expected one inspected record");
        };
        assert_eq!(record.filtered(), Some(FILTERED_REASON));
    }

    struct InlineListing;

    impl ListingParser for InlineListing {
        fn items(&self, response: &Response, _context: &ListingContext<'_>) -> Vec<ListingItem> {
            vec![
                ListingItem::Record(Record::Scene(Scene {
                    title: "Inline".to_string(),
                    date: "2024-06-10T00:00:00".to_string(),
                    url: response.url.clone(),
                    ..Default::default()
                })),
                ListingItem::Detail {
                    url: "https://example.com/scene/3".to_string(),
                    overrides: Overrides::new().with("title", "From Listing"),
                },
            ]
        }
    }

    #[test]
    fn test_custom_listing_parser() {
        let mut config = config();
        config.settings.limit_pages = PageLimit::Pages(1);
        let scraper = scraper(config).with_listing(InlineListing);
        let start = scraper.start_requests().unwrap().remove(0);
        let response = Response::new(start.url.clone(), "<html></html>");

        let output = scraper.parse(&response, &start, None);
        assert_eq!(output.len(), 2);
        assert!(matches!(&output[0], Output::Record(Record::Scene(s)) if s.title == "Inline"));
        let Output::Request(detail) = &output[1] else {
            panic!("expected a detail request");
        };
        assert_eq!(detail.overrides.text("title").as_deref(), Some("From Listing"));
    }
}
