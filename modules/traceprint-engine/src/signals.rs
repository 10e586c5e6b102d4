//! Identity signals harvested from one record.

use std::collections::BTreeSet;

use traceprint_common::{normalize, RawRecord, User};

/// Everything about a record that can tie it to a person, already in
/// canonical form.
#[derive(Debug, Clone, Default)]
pub struct SignalSet {
    pub names: BTreeSet<String>,
    pub emails: BTreeSet<String>,
    pub phones: BTreeSet<String>,
    pub embedding: Option<Vec<f32>>,
    pub transcript: Option<String>,
}

impl SignalSet {
    /// Pull signals out of a record's author fields and content. The
    /// scanned user's seeds tell us which in-content mentions matter.
    pub fn harvest(record: &RawRecord, user: &User) -> Self {
        let mut signals = Self::default();

        if let Some(name) = &record.author_name {
            let name = normalize::normalize_name(name);
            if !name.is_empty() {
                signals.names.insert(name);
            }
        }
        if let Some(email) = &record.author_email {
            let email = normalize::canonical_email(email);
            if !email.is_empty() {
                signals.emails.insert(email);
            }
        }
        if let Some(phone) = record.author_phone.as_deref().and_then(normalize::e164_phone) {
            signals.phones.insert(phone);
        }

        signals.scan_text(&record.content, user);
        signals
    }

    /// A record with no signals at all cannot be attributed to anyone.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
            && self.emails.is_empty()
            && self.phones.is_empty()
            && self.embedding.is_none()
    }

    /// Find mentions of the user's seed identifiers in free text. Applied
    /// to record content and, later, to transcripts.
    pub fn scan_text(&mut self, text: &str, user: &User) {
        let haystack = normalize::normalize_name(text);

        let seed_name = normalize::normalize_name(&user.full_name);
        if !seed_name.is_empty() && haystack.contains(&seed_name) {
            self.names.insert(seed_name);
        }

        let seed_email = normalize::canonical_email(&user.email);
        if !seed_email.is_empty() && haystack.contains(&seed_email) {
            self.emails.insert(seed_email);
        }

        if let Some(seed_phone) = user.phone.as_deref().and_then(normalize::e164_phone) {
            // Phones in prose carry arbitrary separators and often omit the
            // country code; compare on the tail of the digit sequence.
            let digits: String = haystack.chars().filter(|c| c.is_ascii_digit()).collect();
            let seed_digits = seed_phone.trim_start_matches('+');
            let tail = &seed_digits[seed_digits.len().saturating_sub(9)..];
            if digits.contains(tail) {
                self.phones.insert(seed_phone);
            }
        }
    }
}
