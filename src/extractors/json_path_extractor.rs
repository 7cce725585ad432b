//! Slash separated JSON path extraction
//!
//! `/data/items/*/title` walks object keys and array indices. `*` matches
//! any single key or index, `**` any number of levels (including none).

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    AnyOne,
    AnyDepth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(input: &str) -> Self {
        let segments = input
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "*" => Segment::AnyOne,
                "**" => Segment::AnyDepth,
                key => Segment::Key(key.to_string()),
            })
            .collect();
        Self { segments }
    }

    /// Matched values, in traversal order
    pub fn find<'v>(&self, root: &'v Value) -> Vec<&'v Value> {
        let mut found = Vec::new();
        walk(root, &self.segments, &mut found);
        found
    }

    /// Matched values rendered as text.
    ///
    /// Strings come back unquoted, nulls are skipped, and a matched array of
    /// scalars contributes each item. Other objects and arrays render as JSON.
    pub fn select(&self, root: &Value) -> Vec<String> {
        let mut values = Vec::new();
        for value in self.find(root) {
            match value {
                Value::Array(items) if items.iter().all(is_scalar) => {
                    values.extend(items.iter().filter_map(scalar_text));
                }
                other => values.extend(scalar_text(other).or_else(|| {
                    (other.is_object() || other.is_array()).then(|| other.to_string())
                })),
            }
        }
        values
    }
}

fn is_scalar(value: &Value) -> bool {
    !(value.is_object() || value.is_array())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn children(value: &Value) -> Vec<&Value> {
    match value {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    }
}

fn walk<'v>(value: &'v Value, segments: &[Segment], found: &mut Vec<&'v Value>) {
    let Some((head, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match head {
        Segment::Key(key) => {
            let child = match value {
                Value::Object(map) => map.get(key),
                Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            if let Some(child) = child {
                walk(child, rest, found);
            }
        }
        Segment::AnyOne => {
            for child in children(value) {
                walk(child, rest, found);
            }
        }
        Segment::AnyDepth => {
            walk(value, rest, found);
            for child in children(value) {
                walk(child, segments, found);
            }
        }
    }
}
