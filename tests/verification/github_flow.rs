use std::collections::BTreeSet;

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::verification_harness::{
    USER_ID, declared, github_source, harness, mount_account, mount_login, mount_repo_page,
    mount_user, repo_json,
};
use teamup::VerificationError;
use teamup::verify::{TrustLevel, VerificationStatus};

#[tokio::test]
async fn python_and_react_are_verified_from_repositories() {
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
    let h = harness(&server).await;

    let record = h
        .manager
        .verify(
            USER_ID,
            &github_source("octocat"),
            &declared(&["Python", "React", "Docker"]),
        )
        .await
        .expect("verify");

    let expected: BTreeSet<String> = ["Python", "React"].iter().map(|s| (*s).to_string()).collect();
    assert_eq!(record.verified_skills, expected);
    assert_eq!(record.status, VerificationStatus::Verified);

    let metrics = record.metrics.expect("github records carry metrics");
    assert_eq!(metrics.recency, 25);
    assert!(record.overall_score.is_some_and(|s| s <= 100));

    let github = record.sources.github.as_ref().expect("github source");
    assert!(github.oauth_verified);
    assert!(github.inferred_skills.contains("Django"));
}

#[tokio::test]
async fn qualified_declarations_keep_their_spelling() {
    let server = MockServer::start().await;
    mount_account(
        &server,
        "octocat",
        vec![repo_json("ui", "TypeScript", &["react"], 3)],
    )
    .await;
    let h = harness(&server).await;

    let record = h
        .manager
        .verify(
            USER_ID,
            &github_source("octocat"),
            &declared(&["React (Hooks)", "Go"]),
        )
        .await
        .expect("verify");

    assert!(record.verified_skills.contains("React (Hooks)"));
    assert!(!record.verified_skills.contains("Go"));
}

#[tokio::test]
async fn token_for_another_account_is_an_identity_mismatch() {
    let server = MockServer::start().await;
    mount_login(&server, "someone-else").await;
    let h = harness(&server).await;

    let err = h
        .manager
        .verify(USER_ID, &github_source("octocat"), &declared(&["Python"]))
        .await
        .expect_err("mismatch must fail");

    match &err {
        VerificationError::IdentityMismatch {
            claimed,
            authenticated,
        } => {
            assert_eq!(claimed, "octocat");
            assert_eq!(authenticated, "someone-else");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.manager.history(USER_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_token_fails_the_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let h = harness(&server).await;

    let err = h
        .manager
        .verify(USER_ID, &github_source("octocat"), &declared(&["Python"]))
        .await
        .expect_err("401 must fail");
    assert!(matches!(err, VerificationError::FetchFailed(_)));
}

#[tokio::test]
async fn missing_account_is_user_not_found() {
    let server = MockServer::start().await;
    mount_login(&server, "ghost").await;
    Mock::given(method("GET"))
        .and(path("/users/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let h = harness(&server).await;

    let err = h
        .manager
        .verify(USER_ID, &github_source("ghost"), &declared(&["Python"]))
        .await
        .expect_err("404 must fail");
    assert!(matches!(err, VerificationError::UserNotFound { ref username } if username == "ghost"));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn rate_limit_mid_pagination_keeps_partial_results() {
    let server = MockServer::start().await;
    mount_login(&server, "octocat").await;
    mount_user(&server, "octocat").await;
    mount_repo_page(
        &server,
        "octocat",
        1,
        vec![
            repo_json("api", "Go", &[], 2),
            repo_json("site", "Python", &[], 4),
        ],
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/repos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let h = harness(&server).await;

    let record = h
        .manager
        .verify(USER_ID, &github_source("octocat"), &declared(&["Go", "Python"]))
        .await
        .expect("partial results are accepted");
    assert_eq!(record.verified_skills.len(), 2);
}

#[tokio::test]
async fn account_without_repositories_is_recorded_with_low_trust() {
    let server = MockServer::start().await;
    mount_account(&server, "newbie", vec![]).await;
    let h = harness(&server).await;

    let record = h
        .manager
        .verify(USER_ID, &github_source("newbie"), &declared(&["Rust"]))
        .await
        .expect("empty evidence is persisted by default");
    assert!(record.verified_skills.is_empty());
    assert!(record.trust_level() <= TrustLevel::Low);
    assert!(h.manager.get_active(USER_ID).await.unwrap().is_some());
}

#[tokio::test]
async fn foreign_profile_host_is_rejected() {
    let server = MockServer::start().await;
    let h = harness(&server).await;
    let source = teamup::verify::EvidenceSource::GitHub(teamup::verify::GitHubEvidence {
        profile_url: "https://gitlab.com/octocat".into(),
        access_token: "gho_x".into(),
    });

    let err = h
        .manager
        .verify(USER_ID, &source, &declared(&["Rust"]))
        .await
        .expect_err("non-github host");
    assert!(matches!(err, VerificationError::InvalidProfileUrl { .. }));
}
