//! Tolerant `Date:` header parsing.
//!
//! Real mail carries every date format imaginable. Strict RFC 2822 and
//! RFC 3339 are tried first, then a normalized form against a list of
//! common layouts, and finally `mail-parser`'s own date parser.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Zone abbreviations seen in the wild, with their offsets.
const NAMED_ZONES: [(&str, &str); 13] = [
    ("UT", "+0000"),
    ("UTC", "+0000"),
    ("GMT", "+0000"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
];

const ZONED_FORMATS: [&str; 4] = [
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
];

/// Layouts without a zone are taken as UTC.
const NAIVE_FORMATS: [&str; 6] = [
    "%d %b %Y %H:%M:%S",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Best-effort parse of a `Date:` header value. `None` if nothing fits.
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc2822(input)
        .or_else(|_| DateTime::parse_from_rfc3339(input))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_normalized(input))
        .or_else(|| parse_with_mail_parser(input));

    if parsed.is_none() {
        debug!(date = input, "Unparseable date");
    }
    parsed
}

fn parse_normalized(input: &str) -> Option<DateTime<Utc>> {
    let text = strip_comment(input);
    let text = strip_weekday(text);
    let text = numeric_zone(&dashed_month(text));

    let zoned = ZONED_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&text, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc));

    zoned.or_else(|| {
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(&text, fmt).ok())
            .map(|naive| naive.and_utc())
    })
}

/// `mail-parser` knows a few more broken variants.
fn parse_with_mail_parser(input: &str) -> Option<DateTime<Utc>> {
    let header = format!("Date: {input}\r\n\r\n");
    let message = mail_parser::MessageParser::default().parse(header.as_bytes())?;
    let date = message.date()?;
    DateTime::<Utc>::from_timestamp(date.to_timestamp(), 0)
}

/// `"... +0000 (UTC)"` → `"... +0000"`.
fn strip_comment(s: &str) -> &str {
    match s.rfind(" (") {
        Some(pos) if s.ends_with(')') => s[..pos].trim_end(),
        _ => s,
    }
}

/// `"Thu, 04 Jan ..."` or `"Thu 04 Jan ..."` → `"04 Jan ..."`.
fn strip_weekday(s: &str) -> &str {
    let Some(prefix) = s.get(..3) else {
        return s;
    };
    if !WEEKDAYS.iter().any(|day| day.eq_ignore_ascii_case(prefix)) {
        return s;
    }
    match s[3..].chars().next() {
        Some(',') | Some(' ') => s[3..].trim_start_matches(',').trim_start(),
        _ => s,
    }
}

/// IMAP internal-date style `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn dashed_month(s: &str) -> String {
    let parts = s.split_once('-').and_then(|(day, rest)| {
        let (month, rest) = rest.split_once('-')?;
        let name = MONTHS.iter().find(|m| m.eq_ignore_ascii_case(month))?;
        Some(format!("{day} {name} {rest}"))
    });
    parts.unwrap_or_else(|| s.to_string())
}

/// Replace a trailing zone abbreviation with its numeric offset.
fn numeric_zone(s: &str) -> String {
    let Some((head, zone)) = s.rsplit_once(' ') else {
        return s.to_string();
    };
    NAMED_ZONES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(zone))
        .map(|(_, offset)| format!("{head} {offset}"))
        .unwrap_or_else(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn ymd(dt: DateTime<Utc>) -> String {
        dt.format("%Y-%m-%d").to_string()
    }

    #[test]
    fn test_rfc2822() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 +0000").unwrap();
        assert_eq!(ymd(dt), "2024-01-04");
    }

    #[test]
    fn test_named_zone() {
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 EST").is_some());
    }

    #[test]
    fn test_rfc3339() {
        let dt = parse_date("2024-01-04T10:00:00Z").unwrap();
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_imap_style() {
        let dt = parse_date("16-JUL-2025 03:01:03").unwrap();
        assert_eq!(ymd(dt), "2025-07-16");
    }

    #[test]
    fn test_trailing_comment() {
        let dt = parse_date("Mon, 15 Jan 2024 09:00:00 +0000 (UTC)").unwrap();
        assert_eq!(dt.hour(), 9);
    }

    #[test]
    fn test_garbage() {
        assert!(parse_date("").is_none());
        assert!(parse_date("   ").is_none());
        assert!(parse_date("not a date at all").is_none());
    }

    #[test]
    fn test_strip_weekday() {
        assert_eq!(strip_weekday("Thu, 04 Jan"), "04 Jan");
        assert_eq!(strip_weekday("thu 04 Jan"), "04 Jan");
        assert_eq!(strip_weekday("Thursday"), "Thursday");
        assert_eq!(strip_weekday("04 Jan"), "04 Jan");
    }

    #[test]
    fn test_numeric_zone_matches_whole_word() {
        assert_eq!(numeric_zone("10:00:00 CEST"), "10:00:00 +0200");
        assert_eq!(numeric_zone("10:00:00 est"), "10:00:00 -0500");
        assert_eq!(numeric_zone("10:00:00 XEST"), "10:00:00 XEST");
    }

    #[test]
    fn test_dashed_month() {
        assert_eq!(dashed_month("16-jul-2025 03:01:03"), "16 Jul 2025 03:01:03");
        assert_eq!(dashed_month("2024-01-04"), "2024-01-04");
    }
}
