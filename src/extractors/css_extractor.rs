//! CSS selector-based extraction
//!
//! Uses the scraper crate to select elements by CSS selectors. The
//! `::text`, ` ::text` and `::attr(name)` pseudo-elements pick what each
//! matched element contributes; a bare selector yields outer HTML.

use scraper::{ElementRef, Html, Selector};

/// What to take from each matched element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssExtractMode {
    Html,
    /// `sel::text`: the element's own text children
    Text,
    /// `sel ::text`: every text node below the element
    DescendantText,
    Attr(String),
}

#[derive(Debug, Clone)]
pub struct CssQuery {
    selector: Selector,
    mode: CssExtractMode,
}

/// Split a selector into its CSS part and the pseudo-element suffix
pub fn parse_css_selector_with_pseudo(input: &str) -> (String, CssExtractMode) {
    let input = input.trim();
    if let Some(base) = input.strip_suffix("::text") {
        let mode = if base.is_empty() || base.ends_with(char::is_whitespace) {
            CssExtractMode::DescendantText
        } else {
            CssExtractMode::Text
        };
        (base.trim_end().to_string(), mode)
    } else if let Some(pos) = input.rfind("::attr(") {
        let attr_start = pos + 7;
        match input[attr_start..].find(')') {
            Some(attr_end) => {
                let attr_name = input[attr_start..attr_start + attr_end].trim();
                let attr_name = attr_name.trim_matches(|c| c == '"' || c == '\'');
                (
                    input[..pos].trim_end().to_string(),
                    CssExtractMode::Attr(attr_name.to_string()),
                )
            }
            None => (input.to_string(), CssExtractMode::Html),
        }
    } else {
        (input.to_string(), CssExtractMode::Html)
    }
}

impl CssQuery {
    pub fn parse(input: &str) -> Result<Self, String> {
        let (css, mode) = parse_css_selector_with_pseudo(input);
        let css = if css.is_empty() { "*".to_string() } else { css };
        let selector = Selector::parse(&css).map_err(|e| e.to_string())?;
        Ok(Self { selector, mode })
    }

    pub fn mode(&self) -> &CssExtractMode {
        &self.mode
    }

    pub fn select_document(&self, document: &Html) -> Vec<String> {
        self.collect(document.select(&self.selector))
    }

    /// Match below `element` only
    pub fn select_within(&self, element: ElementRef<'_>) -> Vec<String> {
        self.collect(element.select(&self.selector))
    }

    fn collect<'a>(&self, elements: impl Iterator<Item = ElementRef<'a>>) -> Vec<String> {
        let mut values = Vec::new();
        for el in elements {
            match &self.mode {
                CssExtractMode::Html => values.push(el.html()),
                CssExtractMode::Text => values.extend(
                    el.children()
                        .filter_map(|node| node.value().as_text())
                        .map(|t| t.text.to_string())
                        .filter(|t| !t.trim().is_empty()),
                ),
                CssExtractMode::DescendantText => values.extend(
                    el.text()
                        .filter(|t| !t.trim().is_empty())
                        .map(String::from),
                ),
                CssExtractMode::Attr(name) => {
                    if let Some(value) = el.value().attr(name) {
                        values.push(value.to_string());
                    }
                }
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(html: &str, selector: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        CssQuery::parse(selector).unwrap().select_document(&document)
    }

    #[test]
    fn test_css_extract() {
        let html = r#"
        <html>
        <body>
            <div class="price">$19.99</div>
            <div class="price">$29.99</div>
            <a href="/scene/123" class="link">Scene</a>
        </body>
        </html>
        "#;

        let prices = select(html, ".price::text");
        assert_eq!(prices, vec!["$19.99", "$29.99"]);

        let href = select(html, "a.link::attr(href)");
        assert_eq!(href, vec!["/scene/123"]);

        let elements = select(html, "a.link");
        assert_eq!(elements.len(), 1);
        assert!(elements[0].starts_with("<a ") && elements[0].ends_with(">Scene</a>"));
    }

    #[test]
    fn test_direct_and_descendant_text() {
        let html = r#"<div class="desc">Intro <b>bold</b> outro</div>"#;

        assert_eq!(select(html, "div.desc::text"), vec!["Intro ", " outro"]);
        assert_eq!(
            select(html, "div.desc ::text"),
            vec!["Intro ", "bold", " outro"]
        );
    }

    #[test]
    fn test_complex_selectors() {
        let html = r#"
        <div class="scene">
            <span class="name">Scene A</span>
            <span class="models"><a>Jane</a>, <a>John</a></span>
        </div>
        "#;

        assert_eq!(select(html, "div.scene .name::text"), vec!["Scene A"]);
        assert_eq!(select(html, ".models a::text"), vec!["Jane", "John"]);
    }

    #[test]
    fn test_pseudo_parsing() {
        assert_eq!(
            parse_css_selector_with_pseudo("img.cover::attr(\"src\")"),
            ("img.cover".to_string(), CssExtractMode::Attr("src".to_string()))
        );
        assert_eq!(
            parse_css_selector_with_pseudo("h1 ::text"),
            ("h1".to_string(), CssExtractMode::DescendantText)
        );
        assert!(CssQuery::parse("div[").is_err());
    }

    #[test]
    fn test_select_within() {
        let html = r#"<ul><li><a href="/a">A</a></li><li><a href="/b">B</a></li></ul>"#;
        let document = Html::parse_document(html);
        let items = Selector::parse("li").unwrap();
        let link = CssQuery::parse("a::attr(href)").unwrap();

        let hrefs: Vec<Vec<String>> = document
            .select(&items)
            .map(|li| link.select_within(li))
            .collect();
        assert_eq!(hrefs, vec![vec!["/a"], vec!["/b"]]);
    }
}
