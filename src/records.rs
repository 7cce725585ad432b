//! Typed records produced by the builder
//!
//! Scenes, movies and performers serialize to JSON for the submission
//! pipeline. `Overrides` carries caller supplied values (usually propagated
//! from a listing page) that take precedence over extraction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Scene,
    Movie,
    Performer,
}

/// Value type of a declared record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Date,
    Url,
    List,
    /// Base64 image content
    Blob,
    /// Optional identity value (`id`)
    Identity,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldType,
    pub required: bool,
}

const fn field(name: &'static str, kind: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
    }
}

const fn required(name: &'static str, kind: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
    }
}

const SCENE_FIELDS: &[FieldSpec] = &[
    required("title", FieldType::Text),
    field("description", FieldType::Text),
    required("site", FieldType::Text),
    required("date", FieldType::Date),
    field("image", FieldType::Url),
    field("image_blob", FieldType::Blob),
    field("performers", FieldType::List),
    field("tags", FieldType::List),
    required("url", FieldType::Url),
    field("id", FieldType::Identity),
    field("trailer", FieldType::Url),
    field("duration", FieldType::Text),
    required("parent", FieldType::Text),
    required("network", FieldType::Text),
];

const MOVIE_FIELDS: &[FieldSpec] = &[
    required("title", FieldType::Text),
    field("description", FieldType::Text),
    required("site", FieldType::Text),
    required("network", FieldType::Text),
    required("parent", FieldType::Text),
    required("date", FieldType::Date),
    field("front", FieldType::Url),
    field("front_blob", FieldType::Blob),
    field("back", FieldType::Url),
    field("back_blob", FieldType::Blob),
    field("performers", FieldType::List),
    field("tags", FieldType::List),
    required("url", FieldType::Url),
    field("id", FieldType::Identity),
    field("trailer", FieldType::Url),
    field("studio", FieldType::Text),
    field("director", FieldType::Text),
    field("format", FieldType::Text),
    field("length", FieldType::Text),
    field("year", FieldType::Text),
    field("rating", FieldType::Text),
    field("sku", FieldType::Text),
    field("upc", FieldType::Text),
];

const PERFORMER_FIELDS: &[FieldSpec] = &[
    required("name", FieldType::Text),
    required("network", FieldType::Text),
    required("url", FieldType::Url),
    field("image", FieldType::Url),
    field("image_blob", FieldType::Blob),
    field("bio", FieldType::Text),
    field("gender", FieldType::Text),
    field("birthday", FieldType::Text),
    field("astrology", FieldType::Text),
    field("birthplace", FieldType::Text),
    field("ethnicity", FieldType::Text),
    field("nationality", FieldType::Text),
    field("haircolor", FieldType::Text),
    field("eyecolor", FieldType::Text),
    field("weight", FieldType::Text),
    field("height", FieldType::Text),
    field("measurements", FieldType::Text),
    field("tattoos", FieldType::Text),
    field("piercings", FieldType::Text),
    field("cupsize", FieldType::Text),
    field("fakeboobs", FieldType::Text),
];

impl RecordKind {
    /// Fields every record of this kind carries
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            RecordKind::Scene => SCENE_FIELDS,
            RecordKind::Movie => MOVIE_FIELDS,
            RecordKind::Performer => PERFORMER_FIELDS,
        }
    }

    /// Selector map key for detail links on listing pages
    pub fn listing_key(&self) -> &'static str {
        match self {
            RecordKind::Scene => "scenes",
            RecordKind::Movie => "movies",
            RecordKind::Performer => "performers",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Scene => "scene",
            RecordKind::Movie => "movie",
            RecordKind::Performer => "performer",
        }
    }
}

/// Caller supplied field values, keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overrides(Map<String, Value>);

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Truthy raw value for `field`
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| is_truthy(v))
    }

    /// Truthy scalar value for `field`, as text
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).and_then(scalar_text)
    }

    /// Truthy list value for `field`; a lone string becomes a one-item list
    pub fn list(&self, field: &str) -> Option<Vec<String>> {
        match self.get(field)? {
            Value::Array(items) => Some(items.iter().filter_map(scalar_text).collect()),
            other => scalar_text(other).map(|s| vec![s]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Overrides {
    fn from(map: Map<String, Value>) -> Self {
        Overrides(map)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub title: String,
    pub description: String,
    pub site: String,
    pub date: String,
    pub image: Option<String>,
    pub image_blob: Option<String>,
    pub performers: Vec<String>,
    pub tags: Vec<String>,
    pub url: String,
    pub id: Option<String>,
    pub trailer: String,
    pub duration: String,
    pub parent: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub title: String,
    pub description: String,
    pub site: String,
    pub network: String,
    pub parent: String,
    pub date: String,
    pub front: Option<String>,
    pub front_blob: Option<String>,
    pub back: Option<String>,
    pub back_blob: Option<String>,
    pub performers: Vec<String>,
    pub tags: Vec<String>,
    pub url: String,
    pub id: Option<String>,
    pub trailer: String,
    pub studio: String,
    pub director: String,
    pub format: String,
    pub length: String,
    pub year: String,
    pub rating: String,
    pub sku: String,
    pub upc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performer {
    pub name: String,
    pub network: String,
    pub url: String,
    pub image: Option<String>,
    pub image_blob: Option<String>,
    pub bio: String,
    pub gender: String,
    pub birthday: String,
    pub astrology: String,
    pub birthplace: String,
    pub ethnicity: String,
    pub nationality: String,
    pub haircolor: String,
    pub eyecolor: String,
    pub weight: String,
    pub height: String,
    pub measurements: String,
    pub tattoos: String,
    pub piercings: String,
    pub cupsize: String,
    pub fakeboobs: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Scene(Scene),
    Movie(Movie),
    Performer(Performer),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Scene(_) => RecordKind::Scene,
            Record::Movie(_) => RecordKind::Movie,
            Record::Performer(_) => RecordKind::Performer,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Record::Scene(s) => &s.url,
            Record::Movie(m) => &m.url,
            Record::Performer(p) => &p.url,
        }
    }

    /// Release date, for kinds that have one
    pub fn date(&self) -> Option<&str> {
        match self {
            Record::Scene(s) => Some(&s.date),
            Record::Movie(m) => Some(&m.date),
            Record::Performer(_) => None,
        }
    }

    /// Mark a record that the date filter would have dropped
    pub fn set_filtered(&mut self, reason: impl Into<String>) {
        match self {
            Record::Scene(s) => s.filtered = Some(reason.into()),
            Record::Movie(m) => m.filtered = Some(reason.into()),
            Record::Performer(_) => {}
        }
    }

    pub fn filtered(&self) -> Option<&str> {
        match self {
            Record::Scene(s) => s.filtered.as_deref(),
            Record::Movie(m) => m.filtered.as_deref(),
            Record::Performer(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overrides_truthiness() {
        let overrides = Overrides::new()
            .with("title", "Listing Title")
            .with("description", "")
            .with("performers", json!(["Jane Doe", "John Roe"]))
            .with("tags", json!([]))
            .with("id", 12345)
            .with("image", Value::Null);

        assert_eq!(overrides.text("title"), Some("Listing Title".to_string()));
        assert_eq!(overrides.text("description"), None);
        assert_eq!(
            overrides.list("performers"),
            Some(vec!["Jane Doe".to_string(), "John Roe".to_string()])
        );
        assert_eq!(overrides.list("tags"), None);
        assert_eq!(overrides.text("id"), Some("12345".to_string()));
        assert_eq!(overrides.text("image"), None);
        assert_eq!(overrides.text("missing"), None);
    }

    #[test]
    fn test_declared_fields() {
        let names: Vec<&str> = RecordKind::Scene.fields().iter().map(|f| f.name).collect();
        for name in ["url", "network", "site", "parent", "date"] {
            assert!(names.contains(&name));
        }
        assert!(RecordKind::Performer
            .fields()
            .iter()
            .any(|f| f.name == "network" && f.required));
        assert_eq!(RecordKind::Movie.listing_key(), "movies");
    }

    #[test]
    fn test_record_serialization() {
        let mut record = Record::Scene(Scene {
            title: "A Title".to_string(),
            url: "https://example.com/scene/1".to_string(),
            date: "2024-01-01T00:00:00".to_string(),
            ..Default::default()
        });

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "scene");
        assert_eq!(value["title"], "A Title");
        assert!(value.get("filtered").is_none());
        assert!(value["image"].is_null());

        record.set_filtered("Scene filtered due to date restraint");
        assert_eq!(record.filtered(), Some("Scene filtered due to date restraint"));
        assert_eq!(record.date(), Some("2024-01-01T00:00:00"));
        assert_eq!(record.url(), "https://example.com/scene/1");
    }
}
