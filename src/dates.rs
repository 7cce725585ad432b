//! Date parsing
//!
//! Best-effort: relative phrases, caller supplied strftime layouts, RFC 3339 /
//! RFC 2822, a list of common layouts, then `dateparser` for anything looser.
//! Everything is interpreted as UTC and rendered as `YYYY-MM-DDTHH:MM:SS`.
//! Years outside 1000..=9999 are never accepted, so a two digit year can't
//! slip through a `%Y` layout as year 24.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DateParseError;
use crate::normalize::{cleanup_text, DATE_TRASH};

pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

static ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid regex"));
static WEEKDAY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+").expect("valid regex")
});
static RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d+|an?|one)\s+(second|sec|minute|min|hour|day|week|month|year)s?\s+ago$")
        .expect("valid regex")
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static LEAD_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:posted|published|released|added|updated|uploaded|release date|date)(?:\s+on)?(?:\s*:\s*|\s+)",
    )
    .expect("valid regex")
});
/// `Jan.` and friends
static MONTH_ABBREV_DOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|jun|jul|aug|sept?|oct|nov|dec)\.").expect("valid regex")
});
static AT_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+at\s+(\d)").expect("valid regex"));

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M %p",
    "%B %d, %Y %I:%M %p",
    "%B %d, %Y %H:%M",
    "%B %d %Y %I:%M %p",
    "%B %d %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%m/%d/%y",
    "%m-%d-%y",
    "%d-%m-%y",
    "%d.%m.%y",
    "%B %d, %Y",
    "%B %d,%Y",
    "%B %d %Y",
    "%B, %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
    "%d %B %y",
    "%d-%B-%Y",
    "%Y %B %d",
    "%Y%m%d",
];

/// Layouts missing the day; parsed as the first of the month
const MONTH_FORMATS: &[&str] = &["%B %Y", "%m/%Y", "%Y-%m"];

/// Parse date text relative to the current time
pub fn parse_date(
    text: &str,
    accepted_formats: Option<&[String]>,
) -> Result<NaiveDateTime, DateParseError> {
    parse_date_at(text, accepted_formats, Utc::now().naive_utc())
}

/// Parse date text; relative phrases are resolved against `now`
pub fn parse_date_at(
    text: &str,
    accepted_formats: Option<&[String]>,
    now: NaiveDateTime,
) -> Result<NaiveDateTime, DateParseError> {
    let cleaned = cleanup_text(text, DATE_TRASH);
    if cleaned.is_empty() {
        return Err(DateParseError(text.to_string()));
    }

    let simplified = simplify(&cleaned);

    if let Some(dt) = parse_relative(&simplified, now) {
        return Ok(dt);
    }

    if let Some(formats) = accepted_formats {
        for candidate in [cleaned.as_str(), simplified.as_str()] {
            if let Some(dt) = parse_with_formats(candidate, formats.iter().map(String::as_str)) {
                return Ok(dt);
            }
        }
    }

    parse_inferred(&simplified)
        .or_else(|| parse_loose(&simplified))
        .ok_or_else(|| DateParseError(text.to_string()))
}

/// Render a parsed date the way records carry it
pub fn to_iso(dt: &NaiveDateTime) -> String {
    dt.format(ISO_FORMAT).to_string()
}

/// `YYYY-MM-DD` for a birthday-style field, or `None` when unparseable
pub fn to_iso_date(text: &str) -> Option<String> {
    parse_date(text, None)
        .ok()
        .map(|dt| dt.date().format("%Y-%m-%d").to_string())
}

fn simplify(text: &str) -> String {
    let text = LEAD_IN.replace(text.trim(), "");
    let text = WEEKDAY_PREFIX.replace(&text, "");
    let text = MONTH_ABBREV_DOT.replace_all(&text, "$1");
    let text = AT_TIME.replace_all(&text, " $1");
    let text = ORDINAL.replace_all(&text, "$1");
    let text = WHITESPACE.replace_all(&text, " ");
    text.replace("Sept ", "Sep ")
        .trim()
        .trim_end_matches('.')
        .to_string()
}

fn parse_relative(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    match text.to_lowercase().as_str() {
        "today" | "now" | "just now" => return Some(now),
        "yesterday" => return now.checked_sub_signed(Duration::days(1)),
        _ => {}
    }

    let caps = RELATIVE.captures(text)?;
    let amount = match caps[1].to_lowercase().as_str() {
        "a" | "an" | "one" => 1,
        n => n.parse::<i64>().ok()?,
    };

    match caps[2].to_lowercase().as_str() {
        "second" | "sec" => now.checked_sub_signed(Duration::seconds(amount)),
        "minute" | "min" => now.checked_sub_signed(Duration::minutes(amount)),
        "hour" => now.checked_sub_signed(Duration::hours(amount)),
        "day" => now.checked_sub_signed(Duration::days(amount)),
        "week" => now.checked_sub_signed(Duration::weeks(amount)),
        "month" => now.checked_sub_months(Months::new(u32::try_from(amount).ok()?)),
        "year" => now.checked_sub_months(Months::new(u32::try_from(amount * 12).ok()?)),
        _ => None,
    }
}

/// Drops four digit year layouts that matched a one or two digit year
fn plausible(dt: NaiveDateTime) -> Option<NaiveDateTime> {
    (1000..=9999).contains(&dt.year()).then_some(dt)
}

fn parse_with_formats<'a>(
    text: &str,
    formats: impl IntoIterator<Item = &'a str>,
) -> Option<NaiveDateTime> {
    formats.into_iter().find_map(|format| {
        NaiveDateTime::parse_from_str(text, format)
            .ok()
            .or_else(|| NaiveDate::parse_from_str(text, format).ok()?.and_hms_opt(0, 0, 0))
            .and_then(plausible)
    })
}

fn parse_loose(text: &str) -> Option<NaiveDateTime> {
    match dateparser::parse_with_timezone(text, &Utc) {
        Ok(dt) => plausible(dt.naive_utc()),
        Err(e) => {
            log::trace!("dateparser rejected {:?}: {}", text, e);
            None
        }
    }
}

fn parse_inferred(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }

    if text.len() == 10 && text.bytes().all(|b| b.is_ascii_digit()) {
        let secs = text.parse::<i64>().ok()?;
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc());
    }

    if let Some(dt) = parse_with_formats(text, DATETIME_FORMATS.iter().copied()) {
        return Some(dt);
    }
    if let Some(dt) = parse_with_formats(text, DATE_FORMATS.iter().copied()) {
        return Some(dt);
    }

    let with_day = format!("{} 1", text);
    MONTH_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(&with_day, &format!("{} %d", format))
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(plausible)
    })
}
