//! Record builder
//!
//! Each field resolves through the same chain: a truthy caller override,
//! then a static value from the scraper config, then extraction plus
//! normalization, then the field default.

use chrono::{NaiveDateTime, Utc};

use crate::config::{DatePolicy, ScraperConfig};
use crate::dates::{parse_date, parse_date_at, to_iso, to_iso_date};
use crate::error::RecordError;
use crate::field::{Arity, FieldExtractor};
use crate::images::{fetch_blob, ImageFetcher};
use crate::links::{prepare_url, registrable_domain, resolve_link};
use crate::normalize::{
    capitalize_words, cleanup_text, duration_to_seconds, TagNormalizer, DESCRIPTION_TRASH,
    TITLE_TRASH,
};
use crate::records::{Movie, Overrides, Performer, Record, RecordKind, Scene};
use crate::response::Response;
use crate::selector_map::CompiledSelectorMap;

/// `?nats=` affiliate suffixes are not part of a scene id
const AFFILIATE_MARKER: &str = "?nats";

pub struct RecordBuilder<'a> {
    config: &'a ScraperConfig,
    map: &'a CompiledSelectorMap,
    tags: &'a TagNormalizer,
    images: Option<&'a dyn ImageFetcher>,
    now: Option<NaiveDateTime>,
}

/// Per-response lookup state
struct Fields<'b> {
    response: &'b Response,
    url: String,
    overrides: &'b Overrides,
    statics: &'b Overrides,
    extractor: FieldExtractor<'b>,
}

impl<'b> Fields<'b> {
    /// Override, then static value, then `extract`
    fn text(&self, field: &str, extract: impl FnOnce() -> Option<String>) -> Option<String> {
        self.overrides
            .text(field)
            .or_else(|| self.statics.text(field))
            .or_else(extract)
            .filter(|v| !v.is_empty())
    }

    fn list(&self, field: &str, extract: impl FnOnce() -> Vec<String>) -> Vec<String> {
        self.overrides
            .list(field)
            .or_else(|| self.statics.list(field))
            .unwrap_or_else(extract)
    }

    fn extract(&self, field: &str) -> Option<String> {
        self.extractor
            .extract(self.response, field, &Arity::First)
            .into_single()
    }

    fn extract_joined(&self, field: &str, separator: &str) -> Option<String> {
        self.extractor
            .extract(self.response, field, &Arity::joined(separator))
            .into_single()
    }

    fn extract_list(&self, field: &str) -> Vec<String> {
        self.extractor
            .extract(self.response, field, &Arity::All)
            .into_list()
    }

    /// Extracted value run through `cleanup_text` and title-cased
    fn capitalized(&self, field: &str) -> String {
        self.text(field, || {
            self.extract(field)
                .map(|v| capitalize_words(&cleanup_text(&v, &[])))
        })
        .unwrap_or_default()
    }

    /// Extracted value run through `cleanup_text` only
    fn cleaned(&self, field: &str) -> String {
        self.text(field, || self.extract(field).map(|v| cleanup_text(&v, &[])))
            .unwrap_or_default()
    }

    fn link(&self, field: &str) -> Option<String> {
        self.text(field, || {
            self.extract(field)
                .map(|v| resolve_link(&self.url, &v).trim().replace(' ', "%20"))
        })
    }

    fn domain(&self) -> String {
        registrable_domain(&self.url).unwrap_or_default()
    }
}

impl<'a> RecordBuilder<'a> {
    pub fn new(
        config: &'a ScraperConfig,
        map: &'a CompiledSelectorMap,
        tags: &'a TagNormalizer,
    ) -> Self {
        Self {
            config,
            map,
            tags,
            images: None,
            now: None,
        }
    }

    pub fn with_image_fetcher(mut self, fetcher: &'a dyn ImageFetcher) -> Self {
        self.images = Some(fetcher);
        self
    }

    /// Pin "now" for missing dates and relative phrases
    pub fn at(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    pub fn build(
        &self,
        response: &Response,
        kind: RecordKind,
        overrides: &Overrides,
    ) -> Result<Record, RecordError> {
        let fields = Fields {
            response,
            url: prepare_url(&response.url),
            overrides,
            statics: &self.config.static_fields,
            extractor: FieldExtractor::new(self.map),
        };

        let record = match kind {
            RecordKind::Scene => Record::Scene(self.scene(&fields)?),
            RecordKind::Movie => Record::Movie(self.movie(&fields)?),
            RecordKind::Performer => Record::Performer(self.performer(&fields)),
        };
        log::debug!("built {} from {}", kind.as_str(), response.url);
        Ok(record)
    }

    fn now(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| Utc::now().naive_utc())
    }

    fn title(&self, fields: &Fields<'_>) -> String {
        fields
            .text("title", || {
                fields
                    .extract("title")
                    .map(|t| capitalize_words(&cleanup_text(&t, TITLE_TRASH)))
            })
            .unwrap_or_default()
    }

    fn description(&self, fields: &Fields<'_>) -> String {
        fields
            .text("description", || {
                fields
                    .extract_joined("description", " ")
                    .map(|d| cleanup_text(&d, DESCRIPTION_TRASH))
            })
            .unwrap_or_default()
    }

    fn date(&self, fields: &Fields<'_>) -> Result<String, RecordError> {
        if let Some(date) = fields.text("date", || None) {
            return Ok(date);
        }

        let Some(raw) = fields.extract("date") else {
            return Ok(to_iso(&self.now()));
        };

        let parsed = match self.now {
            Some(now) => parse_date_at(&raw, self.map.date_formats(), now),
            None => parse_date(&raw, self.map.date_formats()),
        };

        match parsed {
            Ok(dt) => Ok(to_iso(&dt)),
            Err(source) => match self.config.settings.date_policy {
                DatePolicy::Strict => Err(RecordError::Date {
                    field: "date",
                    source,
                }),
                DatePolicy::Lenient => {
                    log::warn!("{} on {}, using today", source, fields.url);
                    Ok(to_iso(&self.now()))
                }
            },
        }
    }

    fn performers(&self, fields: &Fields<'_>) -> Vec<String> {
        fields.list("performers", || {
            fields
                .extract_list("performers")
                .iter()
                .map(|p| capitalize_words(&cleanup_text(p, &[])))
                .filter(|p| !p.is_empty())
                .collect()
        })
    }

    fn tags(&self, fields: &Fields<'_>) -> Vec<String> {
        fields.list("tags", || self.tags.normalize(fields.extract_list("tags")))
    }

    fn id(&self, fields: &Fields<'_>) -> Option<String> {
        fields.text("id", || {
            let id = self.map.external_id()?.apply(&fields.url)?;
            let id = match id.find(AFFILIATE_MARKER) {
                Some(pos) => id[..pos].to_string(),
                None => id,
            };
            Some(id)
        })
    }

    /// Base64 JPEG for `image_url`, unless supplied or disabled
    fn blob(&self, fields: &Fields<'_>, field: &str, image_url: Option<&str>) -> Option<String> {
        fields.text(field, || {
            let fetcher = self.images?;
            if !self.config.settings.fetch_images() {
                return None;
            }
            fetch_blob(fetcher, image_url?, &self.config.settings.images)
        })
    }

    /// URL the main image blob is fetched from
    fn blob_source(&self, fields: &Fields<'_>, image: Option<&String>) -> Option<String> {
        if self.map.has("image_blob") {
            fields
                .extract("image_blob")
                .map(|v| resolve_link(&fields.url, &v))
        } else {
            image.cloned()
        }
    }

    fn scene(&self, fields: &Fields<'_>) -> Result<Scene, RecordError> {
        let site = fields.text("site", || None).unwrap_or_else(|| fields.domain());
        let image = fields.link("image");
        let blob_source = self.blob_source(fields, image.as_ref());

        Ok(Scene {
            title: self.title(fields),
            description: self.description(fields),
            date: self.date(fields)?,
            image_blob: self.blob(fields, "image_blob", blob_source.as_deref()),
            image,
            performers: self.performers(fields),
            tags: self.tags(fields),
            id: self.id(fields),
            trailer: fields.link("trailer").unwrap_or_default(),
            duration: fields
                .text("duration", || {
                    fields
                        .extract("duration")
                        .map(|d| duration_to_seconds(&cleanup_text(&d, &[])))
                })
                .unwrap_or_default(),
            parent: fields.text("parent", || None).unwrap_or_else(|| fields.domain()),
            network: fields.text("network", || None).unwrap_or_else(|| fields.domain()),
            url: fields.url.clone(),
            site,
            filtered: None,
        })
    }

    fn movie(&self, fields: &Fields<'_>) -> Result<Movie, RecordError> {
        let site = fields.text("site", || None).unwrap_or_else(|| fields.domain());
        let front = fields.link("front");
        let back = fields.link("back");
        let front_source = self.blob_source(fields, front.as_ref());
        // an `image_blob` selector supplies the front cover only
        let back_blob = if self.map.has("image_blob") {
            fields.text("back_blob", || None)
        } else {
            self.blob(fields, "back_blob", back.as_deref())
        };

        Ok(Movie {
            title: self.title(fields),
            description: self.description(fields),
            network: fields.text("network", || None).unwrap_or_else(|| site.clone()),
            parent: fields.text("parent", || None).unwrap_or_else(|| site.clone()),
            date: self.date(fields)?,
            front_blob: self.blob(fields, "front_blob", front_source.as_deref()),
            back_blob,
            front,
            back,
            performers: self.performers(fields),
            tags: self.tags(fields),
            id: self.id(fields),
            trailer: fields.link("trailer").unwrap_or_default(),
            studio: fields.capitalized("studio"),
            director: fields
                .text("director", || {
                    fields
                        .extract_joined("director", ", ")
                        .map(|d| capitalize_words(&cleanup_text(&d, &[])))
                })
                .unwrap_or_default(),
            format: fields.capitalized("format"),
            length: fields
                .text("length", || {
                    fields
                        .extract("length")
                        .map(|l| duration_to_seconds(&cleanup_text(&l, &[])))
                })
                .unwrap_or_default(),
            year: fields.cleaned("year"),
            rating: fields.cleaned("rating"),
            sku: fields.cleaned("sku"),
            upc: fields.cleaned("upc"),
            url: fields.url.clone(),
            site,
            filtered: None,
        })
    }

    fn performer(&self, fields: &Fields<'_>) -> Performer {
        let image = fields.link("image");
        let blob_source = self.blob_source(fields, image.as_ref());
        let upper = |field: &str| {
            fields
                .text(field, || fields.extract(field).map(|v| cleanup_text(&v, &[]).to_uppercase()))
                .unwrap_or_default()
        };

        Performer {
            name: fields.capitalized("name"),
            network: fields.text("network", || None).unwrap_or_else(|| fields.domain()),
            image_blob: self.blob(fields, "image_blob", blob_source.as_deref()),
            image,
            bio: fields
                .text("bio", || {
                    fields
                        .extract_joined("bio", " ")
                        .map(|b| cleanup_text(&b, DESCRIPTION_TRASH))
                })
                .unwrap_or_default(),
            gender: fields.capitalized("gender"),
            birthday: fields
                .text("birthday", || {
                    fields.extract("birthday").map(|b| {
                        let b = cleanup_text(&b, &[]);
                        to_iso_date(&b).unwrap_or(b)
                    })
                })
                .unwrap_or_default(),
            astrology: fields.capitalized("astrology"),
            birthplace: fields.capitalized("birthplace"),
            ethnicity: fields.capitalized("ethnicity"),
            nationality: fields.capitalized("nationality"),
            haircolor: fields.capitalized("haircolor"),
            eyecolor: fields.capitalized("eyecolor"),
            weight: fields.cleaned("weight"),
            height: fields.cleaned("height"),
            measurements: upper("measurements"),
            tattoos: fields.cleaned("tattoos"),
            piercings: fields.cleaned("piercings"),
            cupsize: upper("cupsize"),
            fakeboobs: fields.capitalized("fakeboobs"),
            url: fields.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use chrono::NaiveDate;
    use serde_json::{json, Map, Value};
    use std::cell::RefCell;

    const SCENE_PAGE: &str = r#"
        <html><body>
            <h1 class="title">  the GREAT escape &amp; more </h1>
            <div class="date">Released: March 3, 2021</div>
            <div class="desc"><p>Description: First part.</p><p>Second part.</p></div>
            <img class="poster" src="/media/poster 1.jpg">
            <div class="models"><a>jane doe</a><a>JOHN ROE</a></div>
            <ul class="tags"><li>Anal, Blonde</li><li>anal</li><li>outdoor</li></ul>
            <video><source src="/trailers/great escape.mp4"></video>
            <span class="length">1:02:03</span>
        </body></html>
    "#;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn selector_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn scene_config() -> ScraperConfig {
        ScraperConfig::new(
            "examplesite",
            selector_map(json!({
                "title": "//h1/text()",
                "description": "//div[@class='desc']/p/text()",
                "date": "div.date::text",
                "image": "img.poster::attr(src)",
                "performers": "//div[@class='models']/a/text()",
                "tags": "//ul[@class='tags']/li/text()",
                "trailer": "//video/source/@src",
                "duration": "span.length::text",
                "external_id": r"scene/(\d+)"
            })),
        )
    }

    struct RecordingFetcher {
        urls: RefCell<Vec<String>>,
    }

    impl ImageFetcher for RecordingFetcher {
        fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.urls.borrow_mut().push(url.to_string());
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn build(config: &ScraperConfig, response: &Response, kind: RecordKind, overrides: &Overrides) -> Result<Record, RecordError> {
        let map = CompiledSelectorMap::compile(config.selector_map.as_ref().unwrap()).unwrap();
        let tags = TagNormalizer::new(&config.tag_aliases);
        RecordBuilder::new(config, &map, &tags)
            .at(now())
            .build(response, kind, overrides)
    }

    #[test]
    fn test_scene_fields() {
        let config = scene_config();
        let response = Response::new(
            "https://www.example.com/scene/123/the-great-escape?nats=abc",
            SCENE_PAGE,
        );

        let Record::Scene(scene) =
            build(&config, &response, RecordKind::Scene, &Overrides::new()).unwrap()
        else {
            panic!("expected a scene");
        };

        assert_eq!(scene.title, "The Great Escape & More");
        assert_eq!(scene.description, "First part. Second part.");
        assert_eq!(scene.date, "2021-03-03T00:00:00");
        assert_eq!(
            scene.image.as_deref(),
            Some("https://www.example.com/media/poster%201.jpg")
        );
        assert_eq!(scene.image_blob, None);
        assert_eq!(scene.performers, vec!["Jane Doe", "John Roe"]);
        assert_eq!(scene.tags, vec!["Anal", "Blonde", "Outdoor"]);
        assert_eq!(
            scene.trailer,
            "https://www.example.com/trailers/great%20escape.mp4"
        );
        assert_eq!(scene.duration, "3723");
        assert_eq!(scene.id.as_deref(), Some("123"));
        assert_eq!(scene.site, "example");
        assert_eq!(scene.network, "example");
        assert_eq!(scene.parent, "example");
        assert_eq!(
            scene.url,
            "https://www.example.com/scene/123/the-great-escape?nats=abc"
        );
    }

    #[test]
    fn test_empty_map_gives_defaults() {
        let config = ScraperConfig::new("bare", Map::new());
        let response = Response::new("https://tour.example.co.uk/scene/9", "<html></html>");

        let Record::Scene(scene) =
            build(&config, &response, RecordKind::Scene, &Overrides::new()).unwrap()
        else {
            panic!("expected a scene");
        };

        assert_eq!(scene.title, "");
        assert_eq!(scene.description, "");
        assert_eq!(scene.date, "2024-06-15T12:00:00");
        assert_eq!(scene.image, None);
        assert!(scene.performers.is_empty());
        assert!(scene.tags.is_empty());
        assert_eq!(scene.id, None);
        assert_eq!(scene.trailer, "");
        assert_eq!(scene.site, "example");
    }

    #[test]
    fn test_override_precedence() {
        let mut config = scene_config();
        config.static_fields.insert("network", "Example Network");
        config.static_fields.insert("title", "Static Title");

        let overrides = Overrides::new()
            .with("title", "Listing Title")
            .with("description", "")
            .with("performers", json!(["Listed Performer"]))
            .with("date", "2020-02-02T00:00:00");
        let response = Response::new("https://www.example.com/scene/5", SCENE_PAGE);

        let Record::Scene(scene) = build(&config, &response, RecordKind::Scene, &overrides).unwrap() else {
            panic!("expected a scene");
        };

        assert_eq!(scene.title, "Listing Title");
        // empty overrides are not truthy, extraction wins
        assert_eq!(scene.description, "First part. Second part.");
        assert_eq!(scene.performers, vec!["Listed Performer"]);
        assert_eq!(scene.date, "2020-02-02T00:00:00");
        assert_eq!(scene.network, "Example Network");
        assert_eq!(scene.site, "example");
    }

    #[test]
    fn test_date_policies() {
        let mut config = ScraperConfig::new(
            "dates",
            selector_map(json!({"date": "div.date::text"})),
        );
        let response = Response::new(
            "https://example.com/scene/1",
            r#"<div class="date">Coming soon</div>"#,
        );

        let Record::Scene(scene) =
            build(&config, &response, RecordKind::Scene, &Overrides::new()).unwrap()
        else {
            panic!("expected a scene");
        };
        assert_eq!(scene.date, "2024-06-15T12:00:00");

        config.settings.date_policy = DatePolicy::Strict;
        assert!(matches!(
            build(&config, &response, RecordKind::Scene, &Overrides::new()),
            Err(RecordError::Date { field: "date", .. })
        ));
    }

    #[test]
    fn test_movie_defaults_and_length() {
        let config = ScraperConfig::new(
            "movies",
            selector_map(json!({
                "title": "h1::text",
                "front": "img.front::attr(src)",
                "back": "img.back::attr(src)",
                "director": "span.director::text",
                "studio": "span.studio::text",
                "length": "span.length::text",
                "date": "span.date::text",
                "date_formats": ["%d.%m.%Y"]
            })),
        );
        let response = Response::new(
            "https://shop.example.com/dvd/77",
            r#"<h1>a movie</h1>
               <img class="front" src="//cdn.example.com/f.jpg"><img class="back" src="/b.jpg">
               <span class="director">jane smith</span><span class="director">bob stone</span>
               <span class="studio">big studio</span>
               <span class="length">2:03</span><span class="date">05.06.2020</span>"#,
        );

        let Record::Movie(movie) =
            build(&config, &response, RecordKind::Movie, &Overrides::new()).unwrap()
        else {
            panic!("expected a movie");
        };

        assert_eq!(movie.title, "A Movie");
        assert_eq!(movie.site, "example");
        assert_eq!(movie.network, "example");
        assert_eq!(movie.parent, "example");
        assert_eq!(movie.front.as_deref(), Some("https://cdn.example.com/f.jpg"));
        assert_eq!(movie.back.as_deref(), Some("https://shop.example.com/b.jpg"));
        assert_eq!(movie.director, "Jane Smith, Bob Stone");
        assert_eq!(movie.studio, "Big Studio");
        assert_eq!(movie.length, "123");
        assert_eq!(movie.date, "2020-06-05T00:00:00");
    }

    #[test]
    fn test_performer_fields() {
        let mut config = ScraperConfig::new(
            "models",
            selector_map(json!({
                "name": "h1::text",
                "birthday": "//li[@class='bday']/text()",
                "measurements": "li.meas::text",
                "cupsize": "li.cup::text",
                "height": "li.height::text",
                "haircolor": "li.hair::text"
            })),
        );
        config.static_fields.insert("network", "Example Network");
        let response = Response::new(
            "https://www.example.com/models/jane-doe",
            r#"<h1>jane doe</h1><ul>
                <li class="bday">March 3, 1995</li><li class="meas">34d-24-34</li>
                <li class="cup">dd</li><li class="height">5'6" (168 cm)</li>
                <li class="hair">dark brown</li></ul>"#,
        );

        let Record::Performer(performer) =
            build(&config, &response, RecordKind::Performer, &Overrides::new()).unwrap()
        else {
            panic!("expected a performer");
        };

        assert_eq!(performer.name, "Jane Doe");
        assert_eq!(performer.network, "Example Network");
        assert_eq!(performer.birthday, "1995-03-03");
        assert_eq!(performer.measurements, "34D-24-34");
        assert_eq!(performer.cupsize, "DD");
        assert_eq!(performer.height, "5'6\" (168 cm)");
        assert_eq!(performer.haircolor, "Dark Brown");
        assert_eq!(performer.url, "https://www.example.com/models/jane-doe");
    }

    #[test]
    fn test_image_blob_source() {
        let mut config = scene_config();
        let response = Response::new("https://www.example.com/scene/1", SCENE_PAGE);
        let map = CompiledSelectorMap::compile(config.selector_map.as_ref().unwrap()).unwrap();
        let tags = TagNormalizer::default();
        let fetcher = RecordingFetcher {
            urls: RefCell::new(Vec::new()),
        };

        let builder = RecordBuilder::new(&config, &map, &tags)
            .with_image_fetcher(&fetcher)
            .at(now());
        let record = builder
            .build(&response, RecordKind::Scene, &Overrides::new())
            .unwrap();
        let Record::Scene(scene) = record else {
            panic!("expected a scene");
        };
        // fetch failure degrades to no blob
        assert_eq!(scene.image_blob, None);
        assert_eq!(
            fetcher.urls.borrow().as_slice(),
            ["https://www.example.com/media/poster%201.jpg"]
        );

        // forced updates that don't list `image` skip the fetch
        config.settings.force_update = true;
        let builder = RecordBuilder::new(&config, &map, &tags)
            .with_image_fetcher(&fetcher)
            .at(now());
        builder
            .build(&response, RecordKind::Scene, &Overrides::new())
            .unwrap();
        assert_eq!(fetcher.urls.borrow().len(), 1);
    }

    #[test]
    fn test_image_blob_selector_skips_back_cover() {
        let config = ScraperConfig::new(
            "movies",
            selector_map(json!({
                "title": "h1::text",
                "front": "img.front::attr(src)",
                "back": "img.back::attr(src)",
                "image_blob": "img.hires::attr(src)",
                "date": "span.date::text"
            })),
        );
        let response = Response::new(
            "https://shop.example.com/dvd/77",
            r#"<h1>a movie</h1><span class="date">2020-06-05</span>
               <img class="front" src="/f.jpg"><img class="back" src="/b.jpg">
               <img class="hires" src="/f-large.jpg">"#,
        );
        let map = CompiledSelectorMap::compile(config.selector_map.as_ref().unwrap()).unwrap();
        let tags = TagNormalizer::default();
        let fetcher = RecordingFetcher {
            urls: RefCell::new(Vec::new()),
        };

        let Record::Movie(movie) = RecordBuilder::new(&config, &map, &tags)
            .with_image_fetcher(&fetcher)
            .at(now())
            .build(&response, RecordKind::Movie, &Overrides::new())
            .unwrap()
        else {
            panic!("expected a movie");
        };

        assert_eq!(movie.back.as_deref(), Some("https://shop.example.com/b.jpg"));
        assert_eq!(movie.back_blob, None);
        assert_eq!(
            fetcher.urls.borrow().as_slice(),
            ["https://shop.example.com/f-large.jpg"]
        );
    }
}
