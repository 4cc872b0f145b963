// SPDX-License-Identifier: Apache-2.0

//! Field transforms shared by the game parsers.

use regex::Regex;

use crate::monitor::error::{Error, Result};

const ASSET_PREFIX: &str = "BP_";
const ASSET_SUFFIX: &str = "_C";
const PRIME_MARKER: &str = "Prime";

/// Timestamp of the form `[2026.01.31-04.47.53]` or `[2026.01.31-04.47.53:825]`.
pub const TIMESTAMP_PATTERN: &str =
    r"\[(?P<timestamp>\d{4}\.\d{2}\.\d{2}-\d{2}\.\d{2}\.\d{2}(?::\d{1,3})?)\]";

pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Config(format!("invalid line pattern: {}", e)))
}

/// Clean an engine class name, returning the display name and the Prime flag.
///
/// `BP_TyrannosaurusPrime_C` becomes `("Tyrannosaurus (Prime)", true)`.
pub fn clean_class_name(raw: &str) -> (String, bool) {
    let raw = raw.trim();
    let name = raw.strip_prefix(ASSET_PREFIX).unwrap_or(raw);
    let name = name.strip_suffix(ASSET_SUFFIX).unwrap_or(name);

    if name.contains(PRIME_MARKER) {
        let base = name.replace(PRIME_MARKER, "");
        (format!("{} (Prime)", base.trim()), true)
    } else {
        (name.to_string(), false)
    }
}

/// `male`, `MALE` -> `Male`.
pub fn normalize_gender(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Growth as a fraction in `[0, 1]`. Percentages (`85%`) are scaled down and
/// anything unparseable is 0.
pub fn parse_growth(raw: &str) -> f64 {
    let raw = raw.trim();
    let (number, percent) = match raw.strip_suffix('%') {
        Some(n) => (n, true),
        None => (raw, false),
    };

    let value = match number.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => return 0.0,
    };
    let value = if percent || value > 1.0 { value / 100.0 } else { value };
    value.clamp(0.0, 1.0)
}

/// Split a leading timestamp off a line.
///
/// Returns the timestamp (empty if the line has none) and the remainder of
/// the line after a leading timestamp.
pub fn split_timestamp<'a>(timestamp: &Regex, line: &'a str) -> (String, &'a str) {
    match timestamp.captures(line) {
        Some(caps) => {
            let ts = caps
                .name("timestamp")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let rest = match caps.get(0) {
                Some(m) if line[..m.start()].trim().is_empty() => &line[m.end()..],
                _ => line,
            };
            (ts, rest.trim_start())
        }
        None => (String::new(), line),
    }
}
