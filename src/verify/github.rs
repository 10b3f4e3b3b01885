//! GitHub evidence fetcher.

use anyhow::Context;
use reqwest::StatusCode;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

use super::evidence::RepoMeta;
use crate::config::GitHubConfig;
use crate::error::VerificationError;

type FetchResult<T> = std::result::Result<T, VerificationError>;

/// Source of repository evidence for a GitHub account.
pub trait EvidenceFetcher: Send + Sync {
    /// Login of the account that owns `token`.
    fn authenticated_login<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = FetchResult<String>> + Send + 'a>>;

    /// Public repositories of `username`, most recently pushed first.
    ///
    /// A rate limit hit mid-pagination ends the walk early and returns what
    /// was collected.
    fn fetch_repositories<'a>(
        &'a self,
        username: &'a str,
        token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = FetchResult<Vec<RepoMeta>>> + Send + 'a>>;
}

/// REST client for the GitHub API.
pub struct GitHubFetcher {
    client: reqwest::Client,
    api_base: String,
    max_pages: u32,
    per_page: u32,
    max_retries: u32,
    retry_base: Duration,
}

impl GitHubFetcher {
    pub fn new(config: &GitHubConfig) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Ok(val) = config.user_agent.parse() {
            headers.insert(reqwest::header::USER_AGENT, val);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(anyhow::Error::from)
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            max_pages: config.max_pages.max(1),
            per_page: config.per_page.clamp(1, 100),
            max_retries: config.max_retries,
            retry_base: Duration::from_millis(config.retry_base_ms),
        })
    }

    /// GET with bounded exponential backoff on 5xx. Never retries 4xx.
    async fn get(
        &self,
        url: &str,
        token: Option<&str>,
        query: &[(&str, String)],
    ) -> FetchResult<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            let mut request = self.client.get(url).query(query);
            if let Some(t) = token {
                request = request.bearer_auth(t);
            }

            let resp = request
                .send()
                .await
                .map_err(|e| VerificationError::FetchFailed(format!("GET {url}: {e}")))?;

            if resp.status().is_server_error() && attempt < self.max_retries {
                let delay = self.retry_base * 2u32.saturating_pow(attempt);
                warn!(
                    url,
                    status = %resp.status(),
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "GitHub returned server error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            return Ok(resp);
        }
    }

    fn parse_page(body: &serde_json::Value) -> Vec<RepoMeta> {
        let Some(items) = body.as_array() else {
            return vec![];
        };
        items.iter().filter_map(RepoMeta::from_api).collect()
    }
}

impl EvidenceFetcher for GitHubFetcher {
    fn authenticated_login<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = FetchResult<String>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/user", self.api_base);
            let resp = self.get(&url, Some(token), &[]).await?;

            match resp.status() {
                status if status.is_success() => {}
                StatusCode::UNAUTHORIZED => {
                    return Err(VerificationError::FetchFailed(
                        "access token rejected by GitHub".into(),
                    ));
                }
                status => {
                    return Err(VerificationError::FetchFailed(format!(
                        "GET /user returned {status}"
                    )));
                }
            }

            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| VerificationError::FetchFailed(format!("decode /user: {e}")))?;
            body.get("login")
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| VerificationError::FetchFailed("/user response missing login".into()))
        })
    }

    fn fetch_repositories<'a>(
        &'a self,
        username: &'a str,
        token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = FetchResult<Vec<RepoMeta>>> + Send + 'a>> {
        Box::pin(async move {
            let user_url = format!("{}/users/{username}", self.api_base);
            let resp = self.get(&user_url, token, &[]).await?;
            match resp.status() {
                status if status.is_success() => {}
                StatusCode::NOT_FOUND => {
                    return Err(VerificationError::UserNotFound {
                        username: username.to_string(),
                    });
                }
                status => {
                    return Err(VerificationError::FetchFailed(format!(
                        "GET /users/{username} returned {status}"
                    )));
                }
            }

            let repos_url = format!("{}/users/{username}/repos", self.api_base);
            let mut repos: Vec<RepoMeta> = Vec::new();

            for page in 1..=self.max_pages {
                let query = [
                    ("per_page", self.per_page.to_string()),
                    ("page", page.to_string()),
                    ("sort", "pushed".to_string()),
                ];
                let resp = self.get(&repos_url, token, &query).await?;
                let status = resp.status();

                if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
                    warn!(
                        username,
                        page,
                        collected = repos.len(),
                        "GitHub rate limit hit, keeping partial results"
                    );
                    break;
                }
                if !status.is_success() {
                    return Err(VerificationError::FetchFailed(format!(
                        "GET /users/{username}/repos page {page} returned {status}"
                    )));
                }

                let body: serde_json::Value = resp.json().await.map_err(|e| {
                    VerificationError::FetchFailed(format!("decode repos page {page}: {e}"))
                })?;
                let raw_count = body.as_array().map_or(0, Vec::len);
                let mut items = Self::parse_page(&body);
                debug!(username, page, count = items.len(), "Parsed repository page");
                repos.append(&mut items);

                if raw_count < self.per_page as usize {
                    break;
                }
            }

            Ok(repos)
        })
    }
}

// ── Profile URL ──────────────────────────────────────────────────────────────

/// Extract the username from a claimed GitHub profile URL such as
/// `https://github.com/octocat` or `github.com/octocat/`.
pub fn username_from_profile_url(profile_url: &str) -> FetchResult<String> {
    let invalid = |reason: &str| VerificationError::InvalidProfileUrl {
        url: profile_url.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = profile_url.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = url::Url::parse(&with_scheme).map_err(|_| invalid("not a URL"))?;

    match parsed.host_str() {
        Some("github.com" | "www.github.com") => {}
        _ => return Err(invalid("host is not github.com")),
    }

    let username = parsed
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .ok_or_else(|| invalid("missing username"))?;

    let valid = !username.is_empty()
        && username.len() <= 39
        && !username.starts_with('-')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(invalid("not a valid GitHub username"));
    }
    Ok(username.to_string())
}
