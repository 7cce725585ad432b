//! Field extraction
//!
//! Looks up a field's selector, runs it against the response and shapes the
//! matches for the caller. Extraction never fails: an absent selector or a
//! miss is `RawExtraction::Empty`.

use crate::response::Response;
use crate::selector_map::CompiledSelectorMap;

/// How many matches the caller wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arity {
    /// First match, refined by the field regex
    First,
    /// Every match, trimmed, empties removed
    All,
    /// Every match trimmed and joined with the separator, then refined
    Joined(String),
}

impl Arity {
    pub fn joined(separator: &str) -> Self {
        Arity::Joined(separator.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawExtraction {
    Empty,
    Single(String),
    Many(Vec<String>),
}

impl RawExtraction {
    pub fn is_empty(&self) -> bool {
        matches!(self, RawExtraction::Empty)
    }

    /// Single value; a list collapses to its first item
    pub fn into_single(self) -> Option<String> {
        match self {
            RawExtraction::Empty => None,
            RawExtraction::Single(s) => Some(s),
            RawExtraction::Many(items) => items.into_iter().next(),
        }
    }

    pub fn into_list(self) -> Vec<String> {
        match self {
            RawExtraction::Empty => Vec::new(),
            RawExtraction::Single(s) => vec![s],
            RawExtraction::Many(items) => items,
        }
    }
}

pub struct FieldExtractor<'a> {
    map: &'a CompiledSelectorMap,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(map: &'a CompiledSelectorMap) -> Self {
        Self { map }
    }

    pub fn has(&self, field: &str) -> bool {
        self.map.has(field)
    }

    pub fn extract(&self, response: &Response, field: &str, arity: &Arity) -> RawExtraction {
        let Some(selector) = self.map.selector(field) else {
            return RawExtraction::Empty;
        };

        let matches = selector.query.select(response);
        log::trace!(
            "{}: '{}' matched {} node(s)",
            field,
            selector.query.source(),
            matches.len()
        );
        if matches.is_empty() {
            return RawExtraction::Empty;
        }

        let single = match arity {
            Arity::All if !selector.query.targets_script() => {
                let items: Vec<String> = matches
                    .iter()
                    .map(|m| m.trim())
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect();
                return if items.is_empty() {
                    RawExtraction::Empty
                } else {
                    RawExtraction::Many(items)
                };
            }
            Arity::Joined(separator) => matches
                .iter()
                .map(|m| m.trim())
                .filter(|m| !m.is_empty())
                .collect::<Vec<_>>()
                .join(separator),
            _ => matches.into_iter().next().unwrap_or_default(),
        };

        let refined = match &selector.regex {
            Some(regex) => match regex.apply(&single) {
                Some(value) => value,
                None => return RawExtraction::Empty,
            },
            None => single,
        };

        let refined = refined.trim();
        if refined.is_empty() {
            RawExtraction::Empty
        } else {
            RawExtraction::Single(refined.to_string())
        }
    }
}
