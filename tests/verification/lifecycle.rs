use chrono::{Duration, Utc};
use futures_util::StreamExt;
use wiremock::MockServer;

use super::verification_harness::{
    USER_ID, declared, github_source, harness, mount_account, repo_json,
};
use teamup::VerificationError;
use teamup::verify::{
    InvalidationReason, ProfileEditOutcome, VerificationStatus, VerificationStore,
    skills_drifted,
};

async fn octocat_server() -> MockServer {
    let server = MockServer::start().await;
    mount_account(
        &server,
        "octocat",
        vec![
            repo_json("ml-lab", "Python", &[], 5),
            repo_json("dashboard", "JavaScript", &["react"], 12),
        ],
    )
    .await;
    server
}

#[tokio::test]
async fn at_most_one_record_stays_verified() {
    let server = octocat_server().await;
    let h = harness(&server).await;
    let skills = declared(&["Python", "React"]);

    for _ in 0..3 {
        h.manager
            .verify(USER_ID, &github_source("octocat"), &skills)
            .await
            .expect("verify");
    }
    h.manager
        .invalidate(USER_ID, InvalidationReason::Manual)
        .await
        .expect("invalidate");
    let latest = h
        .manager
        .verify(USER_ID, &github_source("octocat"), &skills)
        .await
        .expect("verify");

    let verified = h
        .store
        .find_by_user_status(USER_ID, VerificationStatus::Verified)
        .await
        .unwrap();
    assert_eq!(verified.len(), 1);
    assert_eq!(verified[0].id, latest.id);

    let history = h.manager.history(USER_ID).await.unwrap();
    assert_eq!(history.len(), 4);
    let superseded = history
        .iter()
        .filter(|r| r.invalidation_reason == Some(InvalidationReason::Superseded))
        .count();
    assert_eq!(superseded, 2);
}

#[tokio::test]
async fn every_persisted_github_record_is_oauth_verified() {
    let server = octocat_server().await;
    let h = harness(&server).await;
    for _ in 0..2 {
        h.manager
            .verify(USER_ID, &github_source("octocat"), &declared(&["Python"]))
            .await
            .expect("verify");
    }

    for record in h.manager.history(USER_ID).await.unwrap() {
        let github = record.sources.github.expect("github source");
        assert!(github.oauth_verified);
    }
}

#[tokio::test]
async fn profile_edit_after_verification_requires_reverification() {
    let server = octocat_server().await;
    let h = harness(&server).await;
    let record = h
        .manager
        .verify(
            USER_ID,
            &github_source("octocat"),
            &declared(&["Python", "React"]),
        )
        .await
        .expect("verify");

    let edited = declared(&["Python", "React", "Kubernetes"]);
    let names: Vec<&str> = edited.iter().map(|s| s.name.as_str()).collect();
    assert!(skills_drifted(&names, &record));

    let outcome = h
        .manager
        .apply_profile_edit(USER_ID, &edited)
        .await
        .expect("profile edit");
    assert!(outcome.requires_reverification());
    assert_eq!(
        outcome,
        ProfileEditOutcome::Invalidated {
            record_id: record.id.clone()
        }
    );

    let stored = h.store.get(&record.id).await.unwrap().expect("record");
    assert_eq!(stored.status, VerificationStatus::Invalidated);
    assert_eq!(
        stored.invalidation_reason,
        Some(InvalidationReason::ProfileEdited)
    );
    assert!(h.manager.get_active(USER_ID).await.unwrap().is_none());
}

#[tokio::test]
async fn reordered_profile_is_not_drift() {
    let server = octocat_server().await;
    let h = harness(&server).await;
    h.manager
        .verify(
            USER_ID,
            &github_source("octocat"),
            &declared(&["Python", "React"]),
        )
        .await
        .expect("verify");

    let outcome = h
        .manager
        .apply_profile_edit(USER_ID, &declared(&["react", "Python"]))
        .await
        .expect("profile edit");
    assert_eq!(outcome, ProfileEditOutcome::Unchanged);
    assert!(h.manager.get_active(USER_ID).await.unwrap().is_some());
}

#[tokio::test]
async fn session_switch_before_start_is_refused() {
    let server = octocat_server().await;
    let h = harness(&server).await;
    h.session.switch_to(Some("intruder".into()));

    let err = h
        .manager
        .verify(USER_ID, &github_source("octocat"), &declared(&["Python"]))
        .await
        .expect_err("session changed");
    assert!(err.is_security_violation());
    assert!(matches!(
        err,
        VerificationError::SecurityContextChanged { ref found, .. } if found.as_deref() == Some("intruder")
    ));
}

#[tokio::test]
async fn stale_records_expire() {
    let server = octocat_server().await;
    let h = harness(&server).await;
    h.manager
        .verify(USER_ID, &github_source("octocat"), &declared(&["Python"]))
        .await
        .expect("verify");

    let next_year = Utc::now() + Duration::days(366);
    assert_eq!(h.manager.expire_stale(USER_ID, next_year).await.unwrap(), 1);
    assert_eq!(h.manager.expire_stale(USER_ID, next_year).await.unwrap(), 0);
    let history = h.manager.history(USER_ID).await.unwrap();
    assert_eq!(history[0].invalidation_reason, Some(InvalidationReason::Expired));
}

#[tokio::test]
async fn subscribers_see_supersede_then_insert() {
    let server = octocat_server().await;
    let h = harness(&server).await;
    let skills = declared(&["Python"]);
    let first = h
        .manager
        .verify(USER_ID, &github_source("octocat"), &skills)
        .await
        .expect("verify");

    let mut changes = Box::pin(
        h.manager
            .subscribe(USER_ID)
            .await
            .expect("subscribe")
            .into_stream(),
    );
    let mut other_user = h.manager.subscribe("user-2").await.expect("subscribe");

    let second = h
        .manager
        .verify(USER_ID, &github_source("octocat"), &skills)
        .await
        .expect("verify");

    let superseded = changes.next().await.expect("superseded change");
    assert_eq!(superseded.id, first.id);
    assert_eq!(superseded.status, VerificationStatus::Invalidated);

    let inserted = changes.next().await.expect("insert change");
    assert_eq!(inserted.id, second.id);
    assert!(inserted.is_active());

    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(50), other_user.recv())
            .await
            .is_err()
    );
}
