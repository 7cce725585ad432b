//! Text normalization for extracted values

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

pub const TITLE_TRASH: &[&str] = &[];
pub const DESCRIPTION_TRASH: &[&str] = &["Description:"];
pub const DATE_TRASH: &[&str] = &["Released:", "Added:", "Published:"];

static COMPOUND_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:(\d{1,3})\s*H)?\s*(\d{1,2})\s*M\s*(\d{1,2})\s*S").expect("valid regex")
});

/// Decode HTML entities, strip every trash substring, trim.
///
/// Repeats until nothing changes, so double-escaped text comes out plain and
/// a second call is a no-op.
pub fn cleanup_text(text: &str, trash: &[&str]) -> String {
    let mut text = text.to_string();
    loop {
        // every pass that changes something makes the text shorter
        let mut next = html_escape::decode_html_entities(&text).into_owned();
        for t in trash {
            if !t.is_empty() {
                next = next.replace(t, "");
            }
        }
        if next == text {
            return text.trim().to_string();
        }
        text = next;
    }
}

/// Title-case every whitespace separated word and join with single spaces
pub fn capitalize_words(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert `HH:MM:SS`, `MM:SS`, `SS` or `1H2M3S` to whole seconds.
///
/// Text in any other shape comes back unchanged.
pub fn duration_to_seconds(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.contains(':') {
        let parts: Vec<&str> = trimmed
            .split(':')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let numbers: Option<Vec<u64>> = parts.iter().map(|p| p.parse::<u64>().ok()).collect();

        let seconds = match numbers.as_deref() {
            Some([h, m, s]) => h
                .checked_mul(3600)
                .and_then(|h| m.checked_mul(60)?.checked_add(h))
                .and_then(|hm| hm.checked_add(*s)),
            Some([m, s]) => m.checked_mul(60).and_then(|m| m.checked_add(*s)),
            Some([s]) => Some(*s),
            _ => None,
        };
        return seconds.map_or_else(|| text.to_string(), |s| s.to_string());
    }

    if let Some(caps) = COMPOUND_DURATION.captures(trimmed) {
        let part = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(0)
        };
        // at most three digits of hours, no overflow
        return (part(1) * 3600 + part(2) * 60 + part(3)).to_string();
    }

    text.to_string()
}

/// Splits, title-cases, aliases and de-duplicates tags
#[derive(Debug, Clone, Default)]
pub struct TagNormalizer {
    aliases: BTreeMap<String, String>,
}

impl TagNormalizer {
    /// `aliases` maps a tag (any case) to its canonical spelling
    pub fn new(aliases: &BTreeMap<String, String>) -> Self {
        Self {
            aliases: aliases
                .iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v.clone()))
                .collect(),
        }
    }

    pub fn normalize<I, S>(&self, tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut result = Vec::new();

        for raw in tags {
            for piece in raw.as_ref().split(',') {
                let piece = cleanup_text(piece, &[]);
                if piece.is_empty() {
                    continue;
                }
                let Some(tag) = self.canonical(&piece) else {
                    continue;
                };
                if seen.insert(tag.to_lowercase()) {
                    result.push(tag);
                }
            }
        }

        result
    }

    fn canonical(&self, tag: &str) -> Option<String> {
        if self.aliases.is_empty() {
            return Some(capitalize_words(tag));
        }

        if let Some(alias) = self.aliases.get(&tag.to_lowercase()) {
            return Some(alias.clone());
        }

        let stripped = tag.trim_end_matches(['.', ',']).trim();
        if stripped.is_empty() {
            return None;
        }
        Some(
            self.aliases
                .get(&stripped.to_lowercase())
                .cloned()
                .unwrap_or_else(|| capitalize_words(stripped)),
        )
    }
}
