//! Selector dialects
//!
//! A selector's leading characters pick its dialect: `//`, `./`, `(` or a
//! function call such as `normalize-space(` is XPath, any other leading `/`
//! is a JSON path, everything else is CSS.

mod css_extractor;
mod json_path_extractor;
mod xpath_extractor;
mod xpath_parser;

pub use css_extractor::*;
pub use json_path_extractor::*;
pub use xpath_extractor::*;
pub use xpath_parser::XPathSyntaxError;

use scraper::ElementRef;

use crate::response::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Css,
    XPath,
    JsonPath,
}

impl Dialect {
    pub fn of(selector: &str) -> Dialect {
        let selector = selector.trim_start();
        if selector.starts_with("//")
            || selector.starts_with("./")
            || selector.starts_with('(')
            || starts_with_call(selector)
        {
            Dialect::XPath
        } else if selector.starts_with('/') {
            Dialect::JsonPath
        } else {
            Dialect::Css
        }
    }
}

/// `name(` at the start; no CSS selector can begin this way
fn starts_with_call(selector: &str) -> bool {
    let name_len = selector
        .find(|c: char| !(c.is_ascii_alphabetic() || c == '-'))
        .unwrap_or(selector.len());
    name_len > 0 && selector[name_len..].trim_start().starts_with('(')
}

#[derive(Debug, Clone)]
enum Compiled {
    Css(CssQuery),
    XPath(XPathQuery),
    Json(JsonPath),
}

/// A selector compiled for its dialect
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    compiled: Compiled,
}

impl Query {
    /// Compile `selector`; the error message describes the syntax problem
    pub fn compile(selector: &str) -> Result<Self, String> {
        let compiled = match Dialect::of(selector) {
            Dialect::Css => Compiled::Css(CssQuery::parse(selector)?),
            Dialect::XPath => {
                Compiled::XPath(XPathQuery::parse(selector.trim()).map_err(|e| e.to_string())?)
            }
            Dialect::JsonPath => Compiled::Json(JsonPath::parse(selector.trim())),
        };

        Ok(Self {
            source: selector.to_string(),
            compiled,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn dialect(&self) -> Dialect {
        match self.compiled {
            Compiled::Css(_) => Dialect::Css,
            Compiled::XPath(_) => Dialect::XPath,
            Compiled::Json(_) => Dialect::JsonPath,
        }
    }

    /// Selectors reading `<script>` bodies are kept whole
    pub fn targets_script(&self) -> bool {
        self.source.contains("/script")
    }

    /// Every match in the response, in document order
    pub fn select(&self, response: &Response) -> Vec<String> {
        match &self.compiled {
            Compiled::Css(q) => q.select_document(response.html()),
            Compiled::XPath(q) => q.select_document(response.html()),
            Compiled::Json(q) => response.json().map(|v| q.select(v)).unwrap_or_default(),
        }
    }

    /// Matches below one element; JSON paths never match inside HTML
    pub fn select_within(&self, element: ElementRef<'_>) -> Vec<String> {
        match &self.compiled {
            Compiled::Css(q) => q.select_within(element),
            Compiled::XPath(q) => q.select_within(element),
            Compiled::Json(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_dispatch() {
        assert_eq!(Dialect::of("//h1/text()"), Dialect::XPath);
        assert_eq!(Dialect::of("./div/a/@href"), Dialect::XPath);
        assert_eq!(Dialect::of("/data/title"), Dialect::JsonPath);
        assert_eq!(Dialect::of("h1.title::text"), Dialect::Css);
        assert_eq!(Dialect::of("div > a::attr(href)"), Dialect::Css);
        assert_eq!(Dialect::of("li:nth-child(2)::text"), Dialect::Css);
        assert_eq!(Dialect::of("normalize-space(//h1)"), Dialect::XPath);
        assert_eq!(Dialect::of("(//a)[2]/@href"), Dialect::XPath);
    }

    #[test]
    fn test_top_level_xpath_functions() {
        let html = Response::new(
            "https://example.com/scene/1",
            r#"<html><body><h1>  Two   Words </h1><a>John</a><a>Jane</a></body></html>"#,
        );

        let query = Query::compile("translate(//a[1]/text(), 'J', 'j')").unwrap();
        assert_eq!(query.dialect(), Dialect::XPath);
        assert_eq!(query.select(&html), vec!["john"]);
        assert_eq!(
            Query::compile("normalize-space(//h1)").unwrap().select(&html),
            vec!["Two Words"]
        );
        assert_eq!(
            Query::compile("count(//a)").unwrap().select(&html),
            vec!["2"]
        );
    }

    #[test]
    fn test_same_field_three_ways() {
        let html = Response::new(
            "https://example.com/scene/1",
            r#"<html><body><h1 class="title">Hello</h1></body></html>"#,
        );
        let json = Response::new("https://example.com/api/1", r#"{"scene": {"title": "Hello"}}"#);

        let css = Query::compile("h1.title::text").unwrap();
        let xpath = Query::compile("//h1[@class='title']/text()").unwrap();
        let path = Query::compile("/scene/title").unwrap();

        assert_eq!(css.select(&html), vec!["Hello"]);
        assert_eq!(xpath.select(&html), vec!["Hello"]);
        assert_eq!(path.select(&json), vec!["Hello"]);
        assert!(path.select(&html).is_empty());
        assert_eq!(path.dialect(), Dialect::JsonPath);
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(Query::compile("//div[@class=").is_err());
        assert!(Query::compile("div[").is_err());
    }

    #[test]
    fn test_script_selectors() {
        let query = Query::compile("//script[contains(text(), 'video')]/text()").unwrap();
        assert!(query.targets_script());
        assert!(!Query::compile("//h1/text()").unwrap().targets_script());
    }
}
