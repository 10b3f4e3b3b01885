//! Evidence types, validated once at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::metrics;
use crate::profile::UserProfile;

// ── Evidence sources ─────────────────────────────────────────────────────────

/// Which evidence path a verification attempt runs.
#[derive(Debug, Clone)]
pub enum EvidenceSource {
    GitHub(GitHubEvidence),
    Certificates(CertificateEvidence),
}

impl EvidenceSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GitHub(_) => "github",
            Self::Certificates(_) => "certificates",
        }
    }
}

/// A GitHub claim backed by an OAuth access token.
///
/// The token is mandatory: a typed-in username alone never proves account
/// control.
#[derive(Clone)]
pub struct GitHubEvidence {
    pub profile_url: String,
    pub access_token: String,
}

impl std::fmt::Debug for GitHubEvidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubEvidence")
            .field("profile_url", &self.profile_url)
            .field("access_token", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CertificateEvidence {
    /// Declared full name on the profile.
    pub profile_name: String,
    pub uploads: Vec<CertificateUpload>,
}

impl CertificateEvidence {
    /// Certificates checked against the profile owner's name.
    pub fn for_profile(profile: &UserProfile, uploads: Vec<CertificateUpload>) -> Self {
        Self {
            profile_name: profile.full_name.trim().to_string(),
            uploads,
        }
    }
}

#[derive(Clone)]
pub struct CertificateUpload {
    pub file_name: String,
    pub image: Vec<u8>,
}

impl std::fmt::Debug for CertificateUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateUpload")
            .field("file_name", &self.file_name)
            .field("image_bytes", &self.image.len())
            .finish()
    }
}

// ── Repository metadata ──────────────────────────────────────────────────────

/// Metadata for one public repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoMeta {
    pub name: String,
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub stars: u64,
    /// Repository size in KB as reported by the API.
    #[serde(default)]
    pub size_kb: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fork: bool,
}

impl RepoMeta {
    /// Parse one item of `GET /users/{username}/repos`. Returns `None` for
    /// items without a name.
    pub fn from_api(item: &serde_json::Value) -> Option<Self> {
        let name = item.get("name")?.as_str()?.to_string();
        let language = item
            .get("language")
            .and_then(|v| v.as_str())
            .map(String::from);
        let topics = item
            .get("topics")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let stars = item
            .get("stargazers_count")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        let size_kb = item
            .get("size")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        let created_at = parse_timestamp(item.get("created_at"));
        let pushed_at = parse_timestamp(item.get("pushed_at"));
        let fork = item
            .get("fork")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        Some(Self {
            name,
            language,
            topics,
            stars,
            size_kb,
            created_at,
            pushed_at,
            fork,
        })
    }
}

fn parse_timestamp(value: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
}

// ── Snapshot ─────────────────────────────────────────────────────────────────

/// Evidence aggregated from one fetch. Never persisted, never reused across
/// attempts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceSnapshot {
    pub languages: BTreeSet<String>,
    /// Lowercased, trimmed topic tags.
    pub topics: BTreeSet<String>,
    pub repo_count: usize,
    /// Heuristic, see [`metrics::estimate_commits`].
    pub total_commits_estimate: u64,
    pub total_stars: u64,
    pub push_timestamps: Vec<DateTime<Utc>>,
    pub last_push: Option<DateTime<Utc>>,
}

impl EvidenceSnapshot {
    pub fn from_repos(repos: &[RepoMeta], now: DateTime<Utc>) -> Self {
        let languages = repos
            .iter()
            .filter_map(|r| r.language.as_deref())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        let topics = repos
            .iter()
            .flat_map(|r| r.topics.iter())
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let push_timestamps: Vec<DateTime<Utc>> =
            repos.iter().filter_map(|r| r.pushed_at).collect();
        let last_push = push_timestamps.iter().max().copied();

        Self {
            languages,
            topics,
            repo_count: repos.len(),
            total_commits_estimate: metrics::estimate_commits(repos, now),
            total_stars: repos.iter().map(|r| r.stars).sum(),
            push_timestamps,
            last_push,
        }
    }

    /// True when the evidence carries no signal at all.
    pub fn is_empty(&self) -> bool {
        self.repo_count == 0
    }
}
