//! Mapping between record identifiers and their backing file names.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Extension of every record file.
pub const RECORD_EXTENSION: &str = ".json";

fn record_file_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(-?\d+)\.json$").ok())
        .as_ref()
}

/// File name backing `id`, e.g. `-7.json`.
pub fn file_name(id: i64) -> String {
    format!("{}{}", id, RECORD_EXTENSION)
}

/// Parse an identifier out of a directory entry name.
///
/// Returns `None` for names that do not look like `<integer>.json`, and for
/// names whose digits do not fit in an `i64`.
pub fn parse_file_name(name: &str) -> Option<i64> {
    let caps = record_file_pattern()?.captures(name)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Parse a user supplied identifier string.
pub fn parse_identifier(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|e| Error::InvalidIdentifier(format!("'{}' is not an integer id: {}", raw, e)))
}
