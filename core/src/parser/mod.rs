//! Log line parsing and classification.
//!
//! Every line in an EQ log starts with a bracketed timestamp:
//! `[Thu Oct 09 21:10:12 2025] You begin casting Clarity.`
//! `parse_line` strips that prefix; the [`Classifier`] turns the remaining
//! message into exactly one [`GameEvent`].

mod classify;

pub use classify::{Classifier, GameEvent};

use chrono::NaiveDateTime;
use memchr::memchr;

const TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// A parsed log entry: timestamp plus the normalized message text.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub message: String,
}

/// Parse a raw log line into a [`LogEntry`].
///
/// Returns `None` for lines without a valid timestamp prefix (the engine
/// tolerates unknown formats without erroring).
pub fn parse_line(line: &str) -> Option<LogEntry> {
    let line = line.trim_end_matches(['\r', '\n']);
    let bytes = line.as_bytes();
    if bytes.first() != Some(&b'[') {
        return None;
    }
    let close = memchr(b']', bytes)?;
    let timestamp = NaiveDateTime::parse_from_str(&line[1..close], TIMESTAMP_FORMAT).ok()?;
    let rest = line.get(close + 1..)?.trim();
    Some(LogEntry {
        timestamp,
        message: normalize_text(rest),
    })
}

/// Canonicalize message text for pattern matching and catalog lookups.
///
/// The client emits two apostrophe glyphs for spell names depending on the
/// source string table (U+2019 and a backtick); both map to ASCII `'`.
/// Also decodes the client's `&PCT;`/`&AMP;` entities.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2019}' | '`' => out.push('\''),
            _ => out.push(c),
        }
    }
    if out.contains('&') {
        out = out.replace("&PCT;", "%").replace("&AMP;", "&");
    }
    out
}

/// Whether this entry is the zoning loading screen (used for gap detection).
pub fn is_loading(entry: &LogEntry) -> bool {
    entry.message.contains("LOADING, PLEASE WAIT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_timestamp_prefix() {
        let entry = parse_line("[Thu Oct 09 21:10:12 2025] You begin casting Clarity.").unwrap();
        assert_eq!(entry.timestamp.year(), 2025);
        assert_eq!(entry.timestamp.hour(), 21);
        assert_eq!(entry.message, "You begin casting Clarity.");
    }

    #[test]
    fn rejects_lines_without_timestamp() {
        assert!(parse_line("no timestamp here").is_none());
        assert!(parse_line("[not a date] text").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn apostrophe_variants_normalize_to_ascii() {
        assert_eq!(normalize_text("Selo\u{2019}s Song"), "Selo's Song");
        assert_eq!(normalize_text("Selo`s Song"), "Selo's Song");
        assert_eq!(normalize_text("Selo's Song"), "Selo's Song");
    }

    #[test]
    fn decodes_client_entities() {
        assert_eq!(normalize_text("50&PCT; off &AMP; more"), "50% off & more");
    }
}
