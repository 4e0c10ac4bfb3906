//! # Environment
//!
//! Lookup helpers with fallbacks. A variable that is unset, empty (for
//! numbers) or unparsable yields the fallback.

/// Value of `key`, or `fallback` when unset
#[must_use]
pub fn var_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

/// Integer value of `key`, or `fallback` when unset, empty or unparsable
///
/// Accepts decimal and `0x`/`0o`/`0b` prefixed values.
#[must_use]
pub fn int_or(key: &str, fallback: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|raw| parse_int(raw.trim()))
        .unwrap_or(fallback)
}

fn parse_int(raw: &str) -> Option<i64> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let lower = digits.to_ascii_lowercase();
    let value = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()?
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        lower.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}
