//! Canonical forms for identity signals and footprint content.
//!
//! Every comparison in identity resolution and dedup happens on these
//! forms, never on raw input.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Collapse whitespace runs to single spaces and trim the ends.
pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-cased, whitespace-collapsed name form.
pub fn normalize_name(s: &str) -> String {
    collapse_ws(&s.to_lowercase())
}

/// Canonical email: trimmed and lower-cased.
pub fn canonical_email(s: &str) -> String {
    s.trim().to_lowercase()
}

/// E.164-style phone form: separators stripped, a single leading `+`.
/// Numbers shorter than 7 digits are noise, not phones.
///
/// Captured payloads are expected to carry the country code; this does
/// not guess one.
pub fn e164_phone(s: &str) -> Option<String> {
    static NON_DIGIT: OnceLock<Regex> = OnceLock::new();
    let re = NON_DIGIT.get_or_init(|| Regex::new(r"\D").expect("static regex"));
    let digits = re.replace_all(s.trim(), "");
    if digits.len() < 7 {
        return None;
    }
    Some(format!("+{digits}"))
}

/// Canonical content form used for duplicate detection.
pub fn canonical_content(s: &str) -> String {
    collapse_ws(&s.to_lowercase())
}

/// SHA-256 over the canonical content form, hex-encoded. The natural
/// dedup key for a footprint together with (user, platform).
pub fn content_hash(content: &str) -> String {
    sha256_hex(&canonical_content(content))
}

/// SHA-256 of a string, hex-encoded.
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}
