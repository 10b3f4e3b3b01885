use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use teamup::verify::{
    GitHubSource, InvalidationReason, SkillMetrics, SqliteVerificationStore, VerificationRecord,
    VerificationSources, VerificationStatus, VerificationStore,
};

fn record(user_id: &str) -> VerificationRecord {
    let now = Utc::now();
    VerificationRecord::verified(
        user_id,
        VerificationSources {
            github: Some(GitHubSource {
                username: "octocat".into(),
                profile_url: "https://github.com/octocat".into(),
                oauth_verified: true,
                inferred_skills: ["Rust", "Go"].iter().map(|s| (*s).to_string()).collect(),
                analyzed_at: now,
            }),
            certificates: None,
        },
        std::iter::once("Rust".to_string()).collect(),
        ["Rust", "Elm"].iter().map(|s| (*s).to_string()).collect::<BTreeSet<_>>(),
        Some(SkillMetrics::new(12, 18, 22, 9)),
        now,
    )
}

#[tokio::test]
async fn records_survive_reopening_the_database() {
    let tmp = TempDir::new().unwrap();
    let db = tmp.path().join("data").join("verifications.db");

    let original = record("user-1");
    {
        let store = SqliteVerificationStore::open(&db).await.expect("open");
        store.insert(&original).await.expect("insert");
        store.pool().close().await;
    }

    let store = SqliteVerificationStore::open(&db).await.expect("reopen");
    let loaded = store
        .latest_by_user_status("user-1", VerificationStatus::Verified)
        .await
        .unwrap()
        .expect("record");
    assert_eq!(loaded, original_with_micros(&original));
    assert_eq!(loaded.overall_score, Some(61));
}

#[tokio::test]
async fn invalidation_survives_reopening_the_database() {
    let tmp = TempDir::new().unwrap();
    let db = tmp.path().join("verifications.db");

    let mut original = record("user-1");
    {
        let store = SqliteVerificationStore::open(&db).await.expect("open");
        store.insert(&original).await.expect("insert");
        original.invalidate(InvalidationReason::Expired, Utc::now());
        store
            .update_batch(std::slice::from_ref(&original))
            .await
            .expect("update");
        store.pool().close().await;
    }

    let store = SqliteVerificationStore::open(&db).await.expect("reopen");
    let history = store.list_for_user("user-1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, VerificationStatus::Invalidated);
    assert_eq!(
        history[0].invalidation_reason,
        Some(InvalidationReason::Expired)
    );
}

#[tokio::test]
async fn watcher_sees_invalidation_written_by_another_store() {
    let tmp = TempDir::new().unwrap();
    let db = tmp.path().join("verifications.db");

    let mut original = record("user-1");
    let writer = SqliteVerificationStore::open(&db).await.expect("open writer");
    writer.insert(&original).await.expect("insert");

    let watcher = SqliteVerificationStore::open(&db)
        .await
        .expect("open watcher")
        .with_poll_interval(Duration::from_millis(50));
    let mut subscription = watcher.subscribe("user-1").await.expect("subscribe");

    original.invalidate(InvalidationReason::Manual, Utc::now());
    writer
        .update_batch(std::slice::from_ref(&original))
        .await
        .expect("update");

    let seen = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("change is polled from disk")
        .expect("feed open");
    assert_eq!(seen.id, original.id);
    assert_eq!(seen.status, VerificationStatus::Invalidated);
}

/// Timestamps are stored with microsecond precision.
fn original_with_micros(record: &VerificationRecord) -> VerificationRecord {
    let truncate = |ts: chrono::DateTime<Utc>| {
        ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
            .parse::<chrono::DateTime<Utc>>()
            .unwrap()
    };
    let mut expected = record.clone();
    expected.verified_at = truncate(expected.verified_at);
    expected
}
