#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use teamup::config::{GitHubConfig, VerificationConfig};
use teamup::profile::{DeclaredSkill, Proficiency};
use teamup::verify::{
    CertificateAnalyzer, EvidenceSource, ExtractedTextAnalyzer, FixedSession, GitHubEvidence,
    GitHubFetcher, SqliteVerificationStore, VerificationManager,
};

pub const USER_ID: &str = "user-1";
pub const TOKEN: &str = "gho_test_token";

pub struct Harness {
    pub manager: VerificationManager,
    pub store: Arc<SqliteVerificationStore>,
    pub session: Arc<FixedSession>,
}

pub fn github_config(server: &MockServer) -> GitHubConfig {
    GitHubConfig {
        api_base_url: server.uri(),
        per_page: 2,
        retry_base_ms: 1,
        ..GitHubConfig::default()
    }
}

pub async fn harness(server: &MockServer) -> Harness {
    harness_with(
        server,
        Arc::new(ExtractedTextAnalyzer),
        VerificationConfig::default(),
    )
    .await
}

pub async fn harness_with(
    server: &MockServer,
    analyzer: Arc<dyn CertificateAnalyzer>,
    config: VerificationConfig,
) -> Harness {
    let store = Arc::new(SqliteVerificationStore::in_memory().await.expect("store"));
    let session = Arc::new(FixedSession::signed_in(USER_ID));
    let fetcher = GitHubFetcher::new(&github_config(server)).expect("fetcher");
    let manager = VerificationManager::new(
        store.clone(),
        Arc::new(fetcher),
        analyzer,
        session.clone(),
        config,
    );
    Harness {
        manager,
        store,
        session,
    }
}

pub fn declared(names: &[&str]) -> Vec<DeclaredSkill> {
    names
        .iter()
        .map(|n| DeclaredSkill::new(*n, Proficiency::Intermediate))
        .collect()
}

pub fn github_source(username: &str) -> EvidenceSource {
    EvidenceSource::GitHub(GitHubEvidence {
        profile_url: format!("https://github.com/{username}"),
        access_token: TOKEN.into(),
    })
}

pub fn repo_json(name: &str, language: &str, topics: &[&str], pushed_days_ago: i64) -> Value {
    let now = Utc::now();
    json!({
        "name": name,
        "language": language,
        "topics": topics,
        "stargazers_count": 2,
        "size": 300,
        "fork": false,
        "created_at": (now - Duration::days(400)).to_rfc3339(),
        "pushed_at": (now - Duration::days(pushed_days_ago)).to_rfc3339(),
    })
}

/// `/user` answers with `login` for any bearer token.
pub async fn mount_login(server: &MockServer, login: &str) {
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": login })))
        .mount(server)
        .await;
}

pub async fn mount_user(server: &MockServer, username: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/users/{username}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": username })))
        .mount(server)
        .await;
}

pub async fn mount_repo_page(server: &MockServer, username: &str, page: u32, repos: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/users/{username}/repos")))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(repos)))
        .mount(server)
        .await;
}

/// Login, profile and repositories split into pages of two, ending with a
/// short page.
pub async fn mount_account(server: &MockServer, username: &str, repos: Vec<Value>) {
    mount_login(server, username).await;
    mount_user(server, username).await;

    let mut page = 1;
    for chunk in repos.chunks(2) {
        mount_repo_page(server, username, page, chunk.to_vec()).await;
        page += 1;
    }
    if repos.len() % 2 == 0 {
        mount_repo_page(server, username, page, vec![]).await;
    }
}
