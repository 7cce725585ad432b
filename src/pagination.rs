//! Pagination controller
//!
//! A listing page is `Fetching(p)`. Once its items are counted it either
//! continues with `p + 1` or is done: zero items, or the page limit reached.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::links::resolve_link;

/// Upper bound on listing pages per start URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLimit {
    Pages(u32),
    /// `"all"` in configuration
    Unbounded,
}

impl Default for PageLimit {
    fn default() -> Self {
        PageLimit::Pages(1)
    }
}

impl PageLimit {
    /// Largest page number that may be fetched
    pub fn max_page(&self) -> u32 {
        match self {
            PageLimit::Pages(n) => (*n).max(1),
            PageLimit::Unbounded => u32::MAX,
        }
    }
}

impl Serialize for PageLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PageLimit::Pages(n) => serializer.serialize_u32(*n),
            PageLimit::Unbounded => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for PageLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u32),
            Word(String),
            Missing(()),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(PageLimit::Pages(n.max(1))),
            Raw::Word(w) if w.eq_ignore_ascii_case("all") => Ok(PageLimit::Unbounded),
            Raw::Word(w) => w
                .trim()
                .parse::<u32>()
                .map(|n| PageLimit::Pages(n.max(1)))
                .map_err(|_| serde::de::Error::custom(format!("invalid page limit '{}'", w))),
            Raw::Missing(()) => Ok(PageLimit::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Fetching(u32),
    Continue(u32),
    Done,
}

/// Page counter carried as request context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationState {
    pub page: u32,
    pub limit: PageLimit,
}

impl PaginationState {
    pub fn new(page: u32, limit: PageLimit) -> Self {
        Self {
            page: page.max(1),
            limit,
        }
    }

    pub fn state(&self) -> PageState {
        PageState::Fetching(self.page)
    }

    /// Transition out of `Fetching(page)` given the number of items found
    pub fn advance(&self, items: usize) -> PageState {
        if items > 0 && self.page < self.limit.max_page() {
            PageState::Continue(self.page + 1)
        } else {
            PageState::Done
        }
    }

    /// State for the continuation request, if any
    pub fn next(&self, items: usize) -> Option<PaginationState> {
        match self.advance(items) {
            PageState::Continue(page) => Some(PaginationState { page, ..*self }),
            _ => None,
        }
    }
}

/// Substitute the page number into a pagination template.
///
/// Accepts `%s`, `%d` and `{page}` placeholders.
pub fn fill_template(template: &str, page: u32) -> String {
    let page = page.to_string();
    template
        .replace("{page}", &page)
        .replace("%s", &page)
        .replace("%d", &page)
}

/// URL of `page` for a listing, resolved against `base`
pub fn page_url(base: &str, template: &str, page: u32) -> String {
    resolve_link(base, &fill_template(template, page))
}
