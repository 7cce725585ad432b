//! Selector map compilation
//!
//! The raw map from configuration is validated once: every query is parsed
//! for its dialect and every regex compiled, so a bad entry fails scraper
//! construction instead of a crawl.

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::ConfigError;
use crate::extractors::Query;

pub const PAGINATION_KEY: &str = "pagination";
pub const DATE_FORMATS_KEY: &str = "date_formats";
pub const EXTERNAL_ID_KEY: &str = "external_id";
pub const REGEX_PREFIX: &str = "re_";

/// A refinement regex in normalized form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexRule {
    pub pattern: String,
    pub group: usize,
    pub case_insensitive: bool,
}

impl RegexRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            group: 1,
            case_insensitive: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledRegex {
    regex: Regex,
    group: usize,
}

impl CompiledRegex {
    pub fn compile(field: &str, rule: &RegexRule) -> Result<Self, ConfigError> {
        let regex = RegexBuilder::new(&rule.pattern)
            .case_insensitive(rule.case_insensitive)
            .build()
            .map_err(|source| ConfigError::InvalidRegex {
                field: field.to_string(),
                source,
            })?;

        // captures_len counts the implicit whole-match group
        let groups = regex.captures_len() - 1;
        let group = if groups == 0 { 0 } else { rule.group };
        if group > groups {
            return Err(ConfigError::MalformedEntry {
                field: field.to_string(),
                message: format!("group {} out of range, pattern has {}", group, groups),
            });
        }

        Ok(Self { regex, group })
    }

    /// The configured group of the first match
    pub fn apply(&self, text: &str) -> Option<String> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(self.group))
            .map(|m| m.as_str().to_string())
    }
}

/// Query plus its refinement regex
#[derive(Debug, Clone)]
pub struct FieldSelector {
    pub query: Query,
    pub regex: Option<CompiledRegex>,
}

/// Validated, immutable selector map
#[derive(Debug, Clone, Default)]
pub struct CompiledSelectorMap {
    fields: HashMap<String, FieldSelector>,
    external_id: Option<CompiledRegex>,
    pagination: Option<String>,
    date_formats: Vec<String>,
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn malformed(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::MalformedEntry {
        field: field.to_string(),
        message: message.into(),
    }
}

fn group_value(field: &str, value: Option<&Value>) -> Result<usize, ConfigError> {
    match value {
        None | Some(Value::Null) => Ok(1),
        Some(v) => v
            .as_u64()
            .map(|g| g as usize)
            .ok_or_else(|| malformed(field, "regex group must be a non-negative integer")),
    }
}

fn flag_value(field: &str, value: Option<&Value>) -> Result<bool, ConfigError> {
    match value {
        None | Some(Value::Null) => Ok(true),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(malformed(field, "case_insensitive must be a boolean")),
    }
}

/// Regex from `pattern`, `[pattern, group]`, `[pattern, group, ci]` or an object
fn regex_rule(field: &str, value: &Value) -> Result<Option<RegexRule>, ConfigError> {
    if is_falsy(value) {
        return Ok(None);
    }

    match value {
        Value::String(pattern) => Ok(Some(RegexRule::new(pattern.as_str()))),
        Value::Array(items) => {
            if items.len() > 3 {
                return Err(malformed(field, "expected [pattern, group, case_insensitive]"));
            }
            let Some(pattern) = items[0].as_str() else {
                return Err(malformed(field, "regex pattern must be a string"));
            };
            Ok(Some(RegexRule {
                pattern: pattern.to_string(),
                group: group_value(field, items.get(1))?,
                case_insensitive: flag_value(field, items.get(2))?,
            }))
        }
        Value::Object(obj) => {
            let pattern = obj
                .get("pattern")
                .or_else(|| obj.get("regex"))
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(field, "regex object needs a 'pattern'"))?;
            Ok(Some(RegexRule {
                pattern: pattern.to_string(),
                group: group_value(field, obj.get("group"))?,
                case_insensitive: flag_value(field, obj.get("case_insensitive"))?,
            }))
        }
        _ => Err(malformed(field, "expected a regex string, list or object")),
    }
}

/// Selector and optional inline regex from a field entry
fn field_entry(field: &str, value: &Value) -> Result<Option<(String, Option<RegexRule>)>, ConfigError> {
    if is_falsy(value) {
        return Ok(None);
    }

    match value {
        Value::String(selector) => Ok(Some((selector.clone(), None))),
        Value::Array(items) => {
            if items.len() > 4 {
                return Err(malformed(
                    field,
                    "expected [selector, regex, group, case_insensitive]",
                ));
            }
            let Some(selector) = items[0].as_str() else {
                return Err(malformed(field, "selector must be a string"));
            };
            if selector.trim().is_empty() {
                return Ok(None);
            }
            let rule = match items.get(1) {
                Some(Value::String(pattern)) if !pattern.is_empty() => Some(RegexRule {
                    pattern: pattern.clone(),
                    group: group_value(field, items.get(2))?,
                    case_insensitive: flag_value(field, items.get(3))?,
                }),
                Some(v) if !is_falsy(v) => {
                    return Err(malformed(field, "regex must be a string"));
                }
                _ => None,
            };
            Ok(Some((selector.to_string(), rule)))
        }
        Value::Object(obj) => {
            let selector = obj
                .get("selector")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(field, "selector object needs a 'selector'"))?;
            if selector.trim().is_empty() {
                return Ok(None);
            }
            let rule = match obj.get("regex") {
                Some(Value::String(pattern)) if !pattern.is_empty() => Some(RegexRule {
                    pattern: pattern.clone(),
                    group: group_value(field, obj.get("group"))?,
                    case_insensitive: flag_value(field, obj.get("case_insensitive"))?,
                }),
                Some(v) if !is_falsy(v) => {
                    return Err(malformed(field, "regex must be a string"));
                }
                _ => None,
            };
            Ok(Some((selector.to_string(), rule)))
        }
        _ => Err(malformed(field, "expected a selector string, list or object")),
    }
}

impl CompiledSelectorMap {
    pub fn compile(map: &Map<String, Value>) -> Result<Self, ConfigError> {
        let mut compiled = CompiledSelectorMap::default();
        let mut regexes: HashMap<String, CompiledRegex> = HashMap::new();
        let mut entries: Vec<(String, Query, Option<RegexRule>)> = Vec::new();

        for (key, value) in map {
            match key.as_str() {
                PAGINATION_KEY => {
                    compiled.pagination = match value {
                        v if is_falsy(v) => None,
                        Value::String(template) => Some(template.clone()),
                        _ => return Err(malformed(key, "pagination must be a URL template")),
                    };
                }
                DATE_FORMATS_KEY => {
                    compiled.date_formats = match value {
                        v if is_falsy(v) => Vec::new(),
                        Value::String(format) => vec![format.clone()],
                        Value::Array(items) => items
                            .iter()
                            .map(|f| {
                                f.as_str()
                                    .map(String::from)
                                    .ok_or_else(|| malformed(key, "date formats must be strings"))
                            })
                            .collect::<Result<_, _>>()?,
                        _ => return Err(malformed(key, "expected a list of date formats")),
                    };
                }
                EXTERNAL_ID_KEY => {
                    if let Some(rule) = regex_rule(key, value)? {
                        compiled.external_id = Some(CompiledRegex::compile(key, &rule)?);
                    }
                }
                k if k.starts_with(REGEX_PREFIX) => {
                    if let Some(rule) = regex_rule(key, value)? {
                        regexes.insert(
                            k[REGEX_PREFIX.len()..].to_string(),
                            CompiledRegex::compile(key, &rule)?,
                        );
                    }
                }
                _ => {
                    if let Some((selector, rule)) = field_entry(key, value)? {
                        let query = Query::compile(&selector).map_err(|message| {
                            ConfigError::InvalidSelector {
                                field: key.clone(),
                                message,
                            }
                        })?;
                        entries.push((key.clone(), query, rule));
                    }
                }
            }
        }

        for (field, query, inline) in entries {
            let regex = match inline {
                Some(rule) => Some(CompiledRegex::compile(&field, &rule)?),
                None => regexes.remove(&field),
            };
            compiled.fields.insert(field, FieldSelector { query, regex });
        }

        if !regexes.is_empty() {
            let mut orphans: Vec<&String> = regexes.keys().collect();
            orphans.sort();
            log::debug!("refinement regexes without a selector: {:?}", orphans);
        }

        Ok(compiled)
    }

    /// Selector for `field`, `None` when absent or disabled
    pub fn selector(&self, field: &str) -> Option<&FieldSelector> {
        self.fields.get(field)
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn external_id(&self) -> Option<&CompiledRegex> {
        self.external_id.as_ref()
    }

    pub fn pagination(&self) -> Option<&str> {
        self.pagination.as_deref()
    }

    /// Caller supplied date layouts, `None` when the map lists none
    pub fn date_formats(&self) -> Option<&[String]> {
        if self.date_formats.is_empty() {
            None
        } else {
            Some(&self.date_formats)
        }
    }
}
