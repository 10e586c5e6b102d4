use std::collections::{BTreeMap, HashMap};

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use traceprint_common::{
    normalize, ExtractionResult, FileConfig, LogAction, MediaKind, MediaRef, RawRecord, RunStatus,
    Source, User, VerificationStatus,
};
use traceprint_engine::{
    MergeReason, NullFaceMatcher, NullTranscriber, StaticFaceMatcher, StaticTranscriber,
    Transformer,
};

fn user() -> User {
    User::new("Rocky Balboa", "rocky@example.com").with_phone("+12125559903")
}

fn extraction(user: &User, records: Vec<RawRecord>) -> ExtractionResult {
    ExtractionResult {
        user_id: user.id,
        run_id: "test-run".to_string(),
        records,
        outcomes: BTreeMap::new(),
        status: RunStatus::Complete,
    }
}

fn plain_transformer() -> Transformer<NullFaceMatcher, NullTranscriber> {
    Transformer::new(NullFaceMatcher, NullTranscriber, &FileConfig::default())
}

fn at(day: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn duplicate_posts_collapse_to_the_earliest() {
    let user = user();
    let records = vec![
        RawRecord::new(Source::Facebook, "Hello   World")
            .with_author_name("Rocky Balboa")
            .with_discovered_at(at(5)),
        RawRecord::new(Source::Facebook, "hello world")
            .with_author_name("Rocky Balboa")
            .with_discovered_at(at(1)),
    ];

    let outcome = plain_transformer()
        .transform(&user, &extraction(&user, records), Vec::new(), &HashMap::new())
        .await;

    assert_eq!(outcome.footprints.len(), 1);
    assert_eq!(outcome.footprints[0].discovered_at, at(1));
    assert_eq!(outcome.stats.duplicates_rejected, 1);
    assert_eq!(outcome.merges[0].reason, MergeReason::IdenticalContent);

    let merged_logs: Vec<_> = outcome
        .logs
        .iter()
        .filter(|l| l.action == LogAction::Merged)
        .collect();
    assert_eq!(merged_logs.len(), 1);
    assert_eq!(merged_logs[0].footprint_id, outcome.footprints[0].id);
}

#[tokio::test]
async fn email_case_variants_resolve_to_one_identity() {
    let user = user();
    let records = vec![
        RawRecord::new(Source::Linkedin, "Consulting inquiries welcome")
            .with_author_email("Apollo@Creed.com")
            .with_discovered_at(at(1)),
        RawRecord::new(Source::X, "New gym opening soon")
            .with_author_email("apollo@creed.com")
            .with_discovered_at(at(2)),
    ];

    let outcome = plain_transformer()
        .transform(&user, &extraction(&user, records), Vec::new(), &HashMap::new())
        .await;

    // The seed cluster plus one founded for the unknown email.
    assert_eq!(outcome.identities.len(), 2);
    assert_eq!(outcome.footprints.len(), 2);
    let ids: Vec<_> = outcome.footprints.iter().map(|f| f.identity_id).collect();
    assert_eq!(ids[0], ids[1]);
    assert!(ids[0].is_some());
    assert_eq!(outcome.stats.identities_founded, 2);
    assert_eq!(outcome.stats.identities_matched, 1);
}

#[tokio::test]
async fn face_match_attributes_to_the_reference_cluster() {
    let user = user().with_reference_photo(MediaRef::new(
        "https://cdn.example.com/rocky-ref.jpg",
        MediaKind::Image,
    ));
    let face = StaticFaceMatcher::new()
        .insert("https://cdn.example.com/rocky-ref.jpg", vec![1.0, 0.0])
        .insert("https://cdn.example.com/candid.jpg", vec![0.92, 0.3919])
        .insert("https://cdn.example.com/stranger.jpg", vec![0.0, 1.0]);
    let transformer = Transformer::new(face, NullTranscriber, &FileConfig::default());

    let records = vec![
        RawRecord::new(Source::Instagram, "great night out")
            .with_media(MediaRef::new(
                "https://cdn.example.com/candid.jpg",
                MediaKind::Image,
            ))
            .with_discovered_at(at(1)),
        RawRecord::new(Source::Instagram, "somebody else entirely")
            .with_media(MediaRef::new(
                "https://cdn.example.com/stranger.jpg",
                MediaKind::Image,
            ))
            .with_discovered_at(at(2)),
    ];

    let outcome = transformer
        .transform(&user, &extraction(&user, records), Vec::new(), &HashMap::new())
        .await;

    let seed = outcome
        .identities
        .iter()
        .find(|i| i.emails.contains("rocky@example.com"))
        .unwrap();

    let candid = &outcome.footprints[0];
    assert_eq!(candid.identity_id, Some(seed.id));
    assert!(candid.confidence > 0.9);

    let stranger = &outcome.footprints[1];
    assert_ne!(stranger.identity_id, Some(seed.id));
    assert_eq!(outcome.stats.face_embeddings, 2);
}

#[tokio::test]
async fn transcripts_feed_identity_signals() {
    let user = user();
    let transcriber = StaticTranscriber::new().insert(
        "https://cdn.example.com/interview.mp4",
        "Tonight we talk with Rocky Balboa about the rematch.",
    );
    let transformer = Transformer::new(NullFaceMatcher, transcriber, &FileConfig::default());

    let records = vec![RawRecord::new(Source::Yahoo, "Interview clip")
        .with_media(MediaRef::new(
            "https://cdn.example.com/interview.mp4",
            MediaKind::Video,
        ))
        .with_discovered_at(at(1))];

    let outcome = transformer
        .transform(&user, &extraction(&user, records), Vec::new(), &HashMap::new())
        .await;

    assert_eq!(outcome.stats.transcripts, 1);
    assert_eq!(outcome.stats.orphans, 0);
    assert_eq!(outcome.footprints[0].status, VerificationStatus::Verified);
    assert!(outcome.footprints[0].identity_id.is_some());
}

#[tokio::test]
async fn unattributable_records_are_kept_as_orphans() {
    let user = user();
    let records = vec![RawRecord::new(Source::Bing, "weather report for tuesday")
        .with_discovered_at(at(1))];

    let outcome = plain_transformer()
        .transform(&user, &extraction(&user, records), Vec::new(), &HashMap::new())
        .await;

    assert_eq!(outcome.stats.orphans, 1);
    assert_eq!(outcome.footprints.len(), 1);
    assert_eq!(outcome.footprints[0].identity_id, None);
    assert_eq!(outcome.footprints[0].status, VerificationStatus::Unverified);
    assert_eq!(outcome.footprints[0].confidence, 0.0);
}

#[tokio::test]
async fn evidence_failure_degrades_to_text_signals() {
    let user = user();
    let face = StaticFaceMatcher::new().failing("https://cdn.example.com/broken.jpg");
    let transformer = Transformer::new(face, NullTranscriber, &FileConfig::default());

    let records = vec![RawRecord::new(Source::Facebook, "race day photos")
        .with_author_name("Rocky Balboa")
        .with_media(MediaRef::new(
            "https://cdn.example.com/broken.jpg",
            MediaKind::Image,
        ))
        .with_discovered_at(at(1))];

    let outcome = transformer
        .transform(&user, &extraction(&user, records), Vec::new(), &HashMap::new())
        .await;

    assert_eq!(outcome.stats.evidence_failures, 1);
    assert_eq!(outcome.footprints.len(), 1);
    assert_eq!(outcome.footprints[0].status, VerificationStatus::Verified);
}

#[tokio::test]
async fn evidence_from_prior_runs_is_rejected() {
    let user = user();
    let content = "rocky wins the title";
    let prior_id = Uuid::new_v4();
    let prior = HashMap::from([(
        (Source::Google, normalize::content_hash(content)),
        prior_id,
    )]);

    let records = vec![RawRecord::new(Source::Google, content)
        .with_author_name("Rocky Balboa")
        .with_discovered_at(at(1))];

    let outcome = plain_transformer()
        .transform(&user, &extraction(&user, records), Vec::new(), &prior)
        .await;

    assert!(outcome.footprints.is_empty());
    assert_eq!(outcome.merges[0].reason, MergeReason::PriorRun);
    assert_eq!(outcome.merges[0].kept, prior_id);
    let rejected_logs: Vec<_> = outcome
        .logs
        .iter()
        .filter(|l| l.action == LogAction::Rejected)
        .collect();
    assert_eq!(rejected_logs.len(), 1);
    assert_eq!(rejected_logs[0].footprint_id, prior_id);
}

#[tokio::test]
async fn reruns_of_the_same_input_decide_identically() {
    let user = user();
    let records = vec![
        RawRecord::new(Source::Facebook, "morning run along the river")
            .with_author_name("Rocky Balboa")
            .with_discovered_at(at(2)),
        RawRecord::new(Source::Facebook, "morning run along the river!")
            .with_author_name("Rocky Balboa")
            .with_discovered_at(at(3)),
        RawRecord::new(Source::Bing, "weather report for tuesday").with_discovered_at(at(1)),
    ];
    let extraction = extraction(&user, records);

    let first = plain_transformer()
        .transform(&user, &extraction, Vec::new(), &HashMap::new())
        .await;
    let second = plain_transformer()
        .transform(&user, &extraction, Vec::new(), &HashMap::new())
        .await;

    let contents = |o: &traceprint_engine::TransformOutcome| -> Vec<String> {
        o.footprints.iter().map(|f| f.content.clone()).collect()
    };
    assert_eq!(contents(&first), contents(&second));
    assert_eq!(first.stats.duplicates_rejected, second.stats.duplicates_rejected);
    assert_eq!(first.stats.orphans, second.stats.orphans);
    assert_eq!(first.identities.len(), second.identities.len());
}
