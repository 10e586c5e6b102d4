use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::normalize;

/// Broad category of a record's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    SocialMedia,
    SearchEngine,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SocialMedia => "social_media",
            Self::SearchEngine => "search_engine",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "social_media" => Ok(Self::SocialMedia),
            "search_engine" => Ok(Self::SearchEngine),
            _ => Err(anyhow::anyhow!("Unknown source kind: {}", s)),
        }
    }
}

/// A concrete platform a record came from. A closed set: supporting a new
/// platform means adding a variant here, not patching dispatch logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Facebook,
    Instagram,
    Linkedin,
    X,
    Google,
    Bing,
    Yahoo,
}

impl Source {
    pub const ALL: [Source; 7] = [
        Source::Facebook,
        Source::Instagram,
        Source::Linkedin,
        Source::X,
        Source::Google,
        Source::Bing,
        Source::Yahoo,
    ];

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Facebook | Self::Instagram | Self::Linkedin | Self::X => SourceKind::SocialMedia,
            Self::Google | Self::Bing | Self::Yahoo => SourceKind::SearchEngine,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Linkedin => "linkedin",
            Self::X => "x",
            Self::Google => "google",
            Self::Bing => "bing",
            Self::Yahoo => "yahoo",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            "linkedin" => Ok(Self::Linkedin),
            "x" => Ok(Self::X),
            "google" => Ok(Self::Google),
            "bing" => Ok(Self::Bing),
            "yahoo" => Ok(Self::Yahoo),
            _ => Err(anyhow::anyhow!("Unknown source: {}", s)),
        }
    }
}

/// Media attached to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

const IMAGE_SUFFIXES: [&str; 4] = [".png", ".jpg", ".jpeg", ".gif"];
const VIDEO_SUFFIXES: [&str; 4] = [".mp4", ".avi", ".wmv", ".mkv"];
const AUDIO_SUFFIXES: [&str; 3] = [".mp3", ".wav", ".ogg"];

impl MediaKind {
    /// Classify a URL by its file suffix. None for non-media URLs.
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_lowercase())
            .unwrap_or_else(|_| url.to_lowercase());
        if IMAGE_SUFFIXES.iter().any(|s| path.ends_with(s)) {
            Some(Self::Image)
        } else if VIDEO_SUFFIXES.iter().any(|s| path.ends_with(s)) {
            Some(Self::Video)
        } else if AUDIO_SUFFIXES.iter().any(|s| path.ends_with(s)) {
            Some(Self::Audio)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a media item attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

impl MediaRef {
    pub fn new(url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    /// Build from a URL, classifying by suffix. None for non-media URLs.
    pub fn from_url(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        MediaKind::from_url(&url).map(|kind| Self { url, kind })
    }
}

/// Shape of a footprint's canonical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FootprintKind {
    Text,
    Image,
    Video,
    Audio,
}

impl FootprintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for FootprintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FootprintKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            _ => Err(anyhow::anyhow!("Unknown footprint kind: {}", s)),
        }
    }
}

/// Review state of a footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(Self::Unverified),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            _ => Err(anyhow::anyhow!("Unknown verification status: {}", s)),
        }
    }
}

/// What happened to a footprint during a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Discovered,
    Merged,
    Rejected,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Merged => "merged",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogAction {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(Self::Discovered),
            "merged" => Ok(Self::Merged),
            "rejected" => Ok(Self::Rejected),
            _ => Err(anyhow::anyhow!("Unknown log action: {}", s)),
        }
    }
}

/// Outcome of a run or of one unit within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    Partial,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The subject of a scan. Created by the caller before a pipeline run;
/// the seeds below are what the extractors query each source with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub reference_photo: Option<MediaRef>,
}

impl User {
    pub fn new(full_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.into(),
            email: email.into(),
            phone: None,
            reference_photo: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_reference_photo(mut self, media: MediaRef) -> Self {
        self.reference_photo = Some(media);
        self
    }
}

/// One raw record from a source extractor — the universal currency of
/// extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: Source,
    pub content: String,
    pub url: Option<String>,
    pub media: Vec<MediaRef>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_phone: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn new(source: Source, content: impl Into<String>) -> Self {
        Self {
            source,
            content: content.into(),
            url: None,
            media: Vec::new(),
            author_name: None,
            author_email: None,
            author_phone: None,
            discovered_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media.push(media);
        self
    }

    pub fn with_author_name(mut self, name: impl Into<String>) -> Self {
        self.author_name = Some(name.into());
        self
    }

    pub fn with_author_email(mut self, email: impl Into<String>) -> Self {
        self.author_email = Some(email.into());
        self
    }

    pub fn with_author_phone(mut self, phone: impl Into<String>) -> Self {
        self.author_phone = Some(phone.into());
        self
    }

    pub fn with_discovered_at(mut self, at: DateTime<Utc>) -> Self {
        self.discovered_at = at;
        self
    }

    /// Footprint shape implied by attached media. Video dominates image,
    /// image dominates audio.
    pub fn footprint_kind(&self) -> FootprintKind {
        let mut kind = FootprintKind::Text;
        for m in &self.media {
            kind = match (kind, m.kind) {
                (_, MediaKind::Video) => FootprintKind::Video,
                (FootprintKind::Video, _) => FootprintKind::Video,
                (_, MediaKind::Image) => FootprintKind::Image,
                (FootprintKind::Image, _) => FootprintKind::Image,
                (_, MediaKind::Audio) => FootprintKind::Audio,
            };
        }
        kind
    }
}

/// One resolved piece of evidence about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigitalFootprint {
    pub id: Uuid,
    pub user_id: Uuid,
    /// The identity cluster this footprint was attributed to. Exactly one
    /// at a time; re-clustering replaces, never duplicates.
    pub identity_id: Option<Uuid>,
    pub source: Source,
    pub kind: FootprintKind,
    pub content: String,
    pub content_hash: String,
    pub url: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub status: VerificationStatus,
    pub confidence: f32,
}

impl DigitalFootprint {
    pub fn from_record(user_id: Uuid, record: &RawRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            identity_id: None,
            source: record.source,
            kind: record.footprint_kind(),
            content: record.content.clone(),
            content_hash: normalize::content_hash(&record.content),
            url: record.url.clone(),
            discovered_at: record.discovered_at,
            status: VerificationStatus::Unverified,
            confidence: 0.0,
        }
    }
}

/// A resolved cluster of identity signals believed to belong to one real
/// person. Signal sets only grow; the centroid is a size-weighted running
/// mean of face embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalIdentity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub names: BTreeSet<String>,
    pub emails: BTreeSet<String>,
    pub phones: BTreeSet<String>,
    pub centroid: Option<Vec<f32>>,
    pub centroid_weight: u32,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

impl PersonalIdentity {
    pub fn founded(user_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            names: BTreeSet::new(),
            emails: BTreeSet::new(),
            phones: BTreeSet::new(),
            centroid: None,
            centroid_weight: 0,
            confidence: 0.0,
            created_at,
        }
    }
}

/// Append-only record of what the pipeline did with a footprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: Uuid,
    pub run_id: String,
    pub footprint_id: Uuid,
    pub action: LogAction,
    /// For merge decisions: the record on the other side of the merge.
    pub related_footprint: Option<Uuid>,
    pub similarity: Option<f32>,
    pub at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn discovered(run_id: &str, footprint_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: run_id.to_string(),
            footprint_id,
            action: LogAction::Discovered,
            related_footprint: None,
            similarity: None,
            at,
        }
    }

    pub fn merged(
        run_id: &str,
        kept: Uuid,
        rejected: Uuid,
        similarity: f32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: run_id.to_string(),
            footprint_id: kept,
            action: LogAction::Merged,
            related_footprint: Some(rejected),
            similarity: Some(similarity),
            at,
        }
    }

    pub fn rejected(
        run_id: &str,
        prior: Uuid,
        rejected: Uuid,
        similarity: f32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: run_id.to_string(),
            footprint_id: prior,
            action: LogAction::Rejected,
            related_footprint: Some(rejected),
            similarity: Some(similarity),
            at,
        }
    }
}

/// Per-source outcome inside one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub status: RunStatus,
    pub records: usize,
    pub elapsed_ms: u64,
    pub from_cache: bool,
    pub error: Option<String>,
}

/// Aggregate of all per-source extractions for one run. Transient; lives
/// only between extract and transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub user_id: Uuid,
    pub run_id: String,
    pub records: Vec<RawRecord>,
    pub outcomes: BTreeMap<Source, SourceOutcome>,
    pub status: RunStatus,
}

impl ExtractionResult {
    pub fn failed_sources(&self) -> Vec<Source> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.status == RunStatus::Failed)
            .map(|(s, _)| *s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_from_url_classifies_by_suffix() {
        assert_eq!(
            MediaKind::from_url("https://cdn.example.com/a/b.jpg"),
            Some(MediaKind::Image)
        );
        assert_eq!(
            MediaKind::from_url("https://cdn.example.com/clip.mp4?t=3"),
            Some(MediaKind::Video)
        );
        assert_eq!(MediaKind::from_url("https://example.com/about"), None);
    }

    #[test]
    fn footprint_kind_video_dominates() {
        let record = RawRecord::new(Source::Instagram, "clip")
            .with_media(MediaRef::new("https://c/x.jpg", MediaKind::Image))
            .with_media(MediaRef::new("https://c/x.mp4", MediaKind::Video));
        assert_eq!(record.footprint_kind(), FootprintKind::Video);
    }

    #[test]
    fn source_round_trips_through_str() {
        for source in Source::ALL {
            let parsed: Source = source.as_str().parse().unwrap();
            assert_eq!(parsed, source);
        }
    }
}
