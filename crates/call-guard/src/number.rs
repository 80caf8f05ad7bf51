//! Phone number normalization
//!
//! Every blocklist write and lookup goes through [`normalize`], so two textual
//! forms of the same number ("+1 (555) 010-0100", "+15550100100") always land on
//! the same key.

use crate::error::{CallGuardError, Result};

/// Canonicalize a phone number: keep ASCII digits and a single leading `+`.
///
/// A `+` survives only when it precedes every digit. Input without any digit
/// normalizes to the empty string. The function is total and idempotent.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut plus = false;
    for c in raw.chars() {
        if c.is_ascii_digit() {
            out.push(c);
        } else if c == '+' && out.is_empty() {
            plus = true;
        }
    }
    if out.is_empty() {
        return out;
    }
    if plus {
        out.insert(0, '+');
    }
    out
}

/// Normalize and reject numbers that carry no digits at all.
pub fn normalize_strict(raw: &str) -> Result<String> {
    let normalized = normalize(raw);
    if normalized.is_empty() {
        return Err(CallGuardError::invalid_argument(format!(
            "'{}' is not a phone number",
            raw
        )));
    }
    Ok(normalized)
}

/// Digit string of an already normalized number (drops the `+`).
pub fn digits(normalized: &str) -> &str {
    normalized.strip_prefix('+').unwrap_or(normalized)
}

/// True when the digits of one number end with the digits of the other and
/// the shorter side has at least `min_digits` digits.
///
/// `min_digits == 0` disables suffix matching; only exact equality counts then.
pub fn suffix_matches(a: &str, b: &str, min_digits: usize) -> bool {
    if a == b {
        return true;
    }
    if min_digits == 0 {
        return false;
    }
    let (a, b) = (digits(a), digits(b));
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= min_digits && long.ends_with(short)
}
