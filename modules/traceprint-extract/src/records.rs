//! Capture payload schemas and their conversion into `RawRecord`s.
//!
//! Records are filtered against the scanned user's identifier set here,
//! before transformation ever sees them. Records carrying media survive
//! the filter unmatched, since face or speech evidence can still
//! attribute them downstream.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use traceprint_common::{normalize, MediaRef, RawRecord, Source, SourceKind, User};

// ---------------------------------------------------------------------------
// Payload schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct SocialCapture {
    #[serde(default)]
    pub profiles: Vec<SocialProfile>,
    #[serde(default)]
    pub posts: Vec<SocialPost>,
}

#[derive(Debug, Deserialize)]
pub struct SocialProfile {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SocialPost {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub author_phone: Option<String>,
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SearchCapture {
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub struct SearchHit {
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub indexed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Parse a raw capture payload and convert it to records. A `Null` payload
/// means the source produced nothing for this user.
pub fn extract_records(source: Source, payload: &Value, user: &User) -> Result<Vec<RawRecord>> {
    if payload.is_null() {
        return Ok(Vec::new());
    }
    match source.kind() {
        SourceKind::SocialMedia => {
            let capture: SocialCapture = serde_json::from_value(payload.clone())
                .with_context(|| format!("Malformed social capture from {source}"))?;
            Ok(social_records(source, capture, user))
        }
        SourceKind::SearchEngine => {
            let capture: SearchCapture = serde_json::from_value(payload.clone())
                .with_context(|| format!("Malformed search capture from {source}"))?;
            Ok(search_records(source, capture, user))
        }
    }
}

fn social_records(source: Source, capture: SocialCapture, user: &User) -> Vec<RawRecord> {
    let mut records = Vec::new();

    for profile in capture.profiles {
        let relevant = names_overlap(&profile.name, &user.full_name)
            || emails_match(profile.email.as_deref(), user)
            || phones_match(profile.phone.as_deref(), user)
            || mentions_text(&profile.bio, user)
            || profile
                .picture_url
                .as_deref()
                .and_then(MediaRef::from_url)
                .is_some();
        if !relevant {
            continue;
        }
        let content = if profile.bio.trim().is_empty() {
            profile.name.clone()
        } else {
            profile.bio.clone()
        };
        let mut record = RawRecord::new(source, content).with_author_name(&profile.name);
        if let Some(email) = &profile.email {
            record = record.with_author_email(email);
        }
        if let Some(phone) = &profile.phone {
            record = record.with_author_phone(phone);
        }
        if let Some(url) = &profile.profile_url {
            record = record.with_url(url);
        }
        if let Some(media) = profile.picture_url.as_deref().and_then(MediaRef::from_url) {
            record = record.with_media(media);
        }
        if let Some(at) = profile.created_at {
            record = record.with_discovered_at(at);
        }
        records.push(record);
    }

    for post in capture.posts {
        let relevant = post
            .author
            .as_deref()
            .is_some_and(|author| names_overlap(author, &user.full_name))
            || emails_match(post.author_email.as_deref(), user)
            || phones_match(post.author_phone.as_deref(), user)
            || mentions_text(&post.text, user)
            || post.media_url.as_deref().and_then(MediaRef::from_url).is_some();
        if !relevant {
            continue;
        }
        let mut record = RawRecord::new(source, &post.text);
        if let Some(author) = &post.author {
            record = record.with_author_name(author);
        }
        if let Some(email) = &post.author_email {
            record = record.with_author_email(email);
        }
        if let Some(phone) = &post.author_phone {
            record = record.with_author_phone(phone);
        }
        if let Some(url) = &post.url {
            record = record.with_url(url);
        }
        if let Some(media) = post.media_url.as_deref().and_then(MediaRef::from_url) {
            record = record.with_media(media);
        }
        if let Some(at) = post.posted_at {
            record = record.with_discovered_at(at);
        }
        records.push(record);
    }

    records
}

fn search_records(source: Source, capture: SearchCapture, user: &User) -> Vec<RawRecord> {
    capture
        .hits
        .into_iter()
        .filter(|hit| mentions_user(hit, user))
        .map(|hit| {
            let content = if hit.snippet.trim().is_empty() {
                hit.title.clone()
            } else {
                format!("{}\n{}", hit.title, hit.snippet)
            };
            let mut record = RawRecord::new(source, content);
            if let Some(email) = &hit.contact_email {
                record = record.with_author_email(email);
            }
            if let Some(phone) = &hit.contact_phone {
                record = record.with_author_phone(phone);
            }
            if let Some(url) = &hit.url {
                record = record.with_url(url);
            }
            if let Some(media) = hit.media_url.as_deref().and_then(MediaRef::from_url) {
                record = record.with_media(media);
            }
            if let Some(at) = hit.indexed_at {
                record = record.with_discovered_at(at);
            }
            record
        })
        .collect()
}

/// A search hit is relevant when its text or contact fields mention the
/// user's name, email, or phone.
fn mentions_user(hit: &SearchHit, user: &User) -> bool {
    mentions_text(&format!("{} {}", hit.title, hit.snippet), user)
        || emails_match(hit.contact_email.as_deref(), user)
        || phones_match(hit.contact_phone.as_deref(), user)
}

fn names_overlap(candidate: &str, seed: &str) -> bool {
    let candidate = normalize::normalize_name(candidate);
    let seed = normalize::normalize_name(seed);
    !candidate.is_empty()
        && !seed.is_empty()
        && (candidate.contains(&seed) || seed.contains(&candidate))
}

fn emails_match(candidate: Option<&str>, user: &User) -> bool {
    candidate
        .is_some_and(|email| normalize::canonical_email(email) == normalize::canonical_email(&user.email))
}

fn phones_match(candidate: Option<&str>, user: &User) -> bool {
    match (candidate.and_then(normalize::e164_phone), user.phone.as_deref()) {
        (Some(candidate), Some(seed)) => Some(candidate) == normalize::e164_phone(seed),
        _ => false,
    }
}

fn mentions_text(text: &str, user: &User) -> bool {
    let haystack = normalize::normalize_name(text);
    haystack.contains(&normalize::normalize_name(&user.full_name))
        || haystack.contains(&normalize::canonical_email(&user.email))
}
