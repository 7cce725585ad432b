//! Crawl driver
//!
//! Pulls requests off a FIFO queue, fetches them and feeds the responses to
//! the scraper. Records come out as iterator items; fetch failures are
//! reported and the crawl moves on. A URL is queued at most once per crawl.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Duration;

use crate::config::{CrawlSettings, ImageSettings};
use crate::error::FetchError;
use crate::images::ImageFetcher;
use crate::records::Record;
use crate::request::{cookie_header, Output, Request};
use crate::response::Response;
use crate::site::SiteScraper;

/// Page bodies above this size are refused
const MAX_PAGE_BYTES: u64 = 50 * 1024 * 1024;

/// Fetches pages for the crawl
pub trait Fetcher {
    fn fetch(&self, request: &Request) -> Result<Response, FetchError>;

    /// Image source for blobs, `None` when the fetcher can't serve images
    fn images(&self) -> Option<&dyn ImageFetcher> {
        None
    }
}

/// Blocking `ureq` fetcher
pub struct HttpFetcher {
    agent: ureq::Agent,
    /// Separate agent so image downloads get their own timeout
    image_agent: ureq::Agent,
    /// Proxy the agent was built with
    proxy: Option<String>,
    user_agent: String,
    timeout: Duration,
    headers: BTreeMap<String, String>,
    cookies: BTreeMap<String, String>,
    images: ImageSettings,
}

fn build_agent(
    user_agent: &str,
    timeout: Duration,
    proxy: Option<&str>,
) -> Result<ureq::Agent, FetchError> {
    let proxy = proxy
        .map(|p| {
            ureq::Proxy::new(p).map_err(|e| FetchError::Transport {
                url: p.to_string(),
                message: format!("invalid proxy: {}", e),
            })
        })
        .transpose()?;

    Ok(ureq::Agent::new_with_config(
        ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .user_agent(user_agent)
            .http_status_as_error(false)
            .proxy(proxy)
            .build(),
    ))
}

/// Header list for one call: explicit headers plus the joined cookies
fn header_list(
    headers: &BTreeMap<String, String>,
    cookies: &BTreeMap<String, String>,
) -> Vec<(String, String)> {
    let mut list: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some(cookie) = cookie_header(cookies) {
        list.push(("Cookie".to_string(), cookie));
    }
    list
}

impl HttpFetcher {
    pub fn new(settings: &CrawlSettings) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(settings.timeout_secs.max(1));
        let image_timeout = Duration::from_secs(settings.images.timeout_secs.max(1));
        let proxy = settings.proxy.as_deref();
        Ok(Self {
            agent: build_agent(&settings.user_agent, timeout, proxy)?,
            image_agent: build_agent(&settings.user_agent, image_timeout, proxy)?,
            proxy: settings.proxy.clone(),
            user_agent: settings.user_agent.clone(),
            timeout,
            headers: settings.headers.clone(),
            cookies: settings.cookies.clone(),
            images: settings.images.clone(),
        })
    }

    /// Page request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Headers sent with every image download
    fn image_headers(&self) -> Vec<(String, String)> {
        header_list(&self.headers, &self.cookies)
    }

    fn get(
        &self,
        agent: &ureq::Agent,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<ureq::http::Response<ureq::Body>, FetchError> {
        let mut call = agent.get(url);
        for (name, value) in headers {
            call = call.header(name.as_str(), value.as_str());
        }

        let response = call.call().map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        url::Url::parse(&request.url).map_err(|_| FetchError::InvalidUrl(request.url.clone()))?;

        // requests may carry a proxy other than the configured one
        let rerouted;
        let agent = if request.proxy == self.proxy {
            &self.agent
        } else {
            rerouted = build_agent(&self.user_agent, self.timeout, request.proxy.as_deref())?;
            &rerouted
        };

        let headers = header_list(&request.headers, &request.cookies);
        let http = self.get(agent, &request.url, &headers)?;

        let status = http.status().as_u16();
        let headers: Vec<(String, String)> = http
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = http
            .into_body()
            .with_config()
            .limit(MAX_PAGE_BYTES)
            .read_to_string()
            .map_err(|e| FetchError::Body {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

        log::debug!("fetched {} ({} bytes)", request.url, body.len());
        let mut response = Response::new(request.url.clone(), body).with_status(status);
        for (name, value) in headers {
            response = response.with_header(&name, value);
        }
        Ok(response)
    }

    fn images(&self) -> Option<&dyn ImageFetcher> {
        Some(self)
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let http = self.get(&self.image_agent, url, &self.image_headers())?;
        http.into_body()
            .with_config()
            .limit(self.images.max_bytes)
            .read_to_vec()
            .map_err(|e| FetchError::Body {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

/// What the crawl produced for one step
#[derive(Debug)]
pub enum CrawlEvent {
    Record(Record),
    /// Debug mode record, not for submission
    Inspect(Record),
    FetchFailed { url: String, error: FetchError },
}

/// Iterator driving one scraper to completion
pub struct Crawl<'a, F: Fetcher> {
    scraper: &'a SiteScraper,
    fetcher: &'a F,
    queue: VecDeque<Request>,
    pending: VecDeque<CrawlEvent>,
    /// Every URL ever queued
    seen: HashSet<String>,
    fetched: usize,
}

impl<'a, F: Fetcher> Crawl<'a, F> {
    pub fn new(scraper: &'a SiteScraper, fetcher: &'a F, start: Vec<Request>) -> Self {
        let mut crawl = Self {
            scraper,
            fetcher,
            queue: VecDeque::new(),
            pending: VecDeque::new(),
            seen: HashSet::new(),
            fetched: 0,
        };
        for request in start {
            crawl.enqueue(request);
        }
        crawl
    }

    fn enqueue(&mut self, request: Request) {
        if self.seen.insert(request.url.clone()) {
            self.queue.push_back(request);
        } else {
            log::debug!("skipping already queued {}", request.url);
        }
    }

    /// Number of responses fetched so far
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    fn step(&mut self, request: Request) {
        let response = match self.fetcher.fetch(&request) {
            Ok(response) => response,
            Err(error) => {
                log::warn!("{}", error);
                self.pending.push_back(CrawlEvent::FetchFailed {
                    url: request.url,
                    error,
                });
                return;
            }
        };
        self.fetched += 1;

        for output in self
            .scraper
            .parse(&response, &request, self.fetcher.images())
        {
            match output {
                Output::Record(record) => self.pending.push_back(CrawlEvent::Record(record)),
                Output::Inspect(record) => self.pending.push_back(CrawlEvent::Inspect(record)),
                Output::Request(next) => self.enqueue(next),
            }
        }
    }
}

impl<F: Fetcher> Iterator for Crawl<'_, F> {
    type Item = CrawlEvent;

    fn next(&mut self) -> Option<CrawlEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let request = self.queue.pop_front()?;
            self.step(request);
        }
    }
}
