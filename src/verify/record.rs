//! The persisted outcome of one verification attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::metrics::SkillMetrics;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Invalidated,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum InvalidationReason {
    /// Declared skills changed after verification.
    ProfileEdited,
    Manual,
    /// Older than the configured maximum age.
    Expired,
    /// Replaced by a newer verification.
    Superseded,
}

/// Trust implied by a record, lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrustLevel {
    Minimal,
    Low,
    Moderate,
    High,
}

impl TrustLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            75.. => Self::High,
            50..=74 => Self::Moderate,
            25..=49 => Self::Low,
            _ => Self::Minimal,
        }
    }
}

// ── Sources ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubSource {
    pub username: String,
    pub profile_url: String,
    /// Always true for persisted records: ownership was proven by an OAuth
    /// token, not a typed-in username.
    pub oauth_verified: bool,
    pub inferred_skills: BTreeSet<String>,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSource {
    pub file_name: String,
    pub extracted_name: String,
    pub name_match: bool,
    #[serde(default)]
    pub course_topics: Vec<String>,
    #[serde(default)]
    pub inferred_skills: Vec<String>,
}

/// Evidence paths that produced a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GitHubSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificates: Option<Vec<CertificateSource>>,
}

// ── Record ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: String,
    pub user_id: String,
    pub status: VerificationStatus,
    pub verified_skills: BTreeSet<String>,
    /// Declared skills at verification time, kept to detect drift.
    pub profile_skills_at_verification: BTreeSet<String>,
    pub sources: VerificationSources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SkillMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<u8>,
    pub verified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidation_reason: Option<InvalidationReason>,
}

impl VerificationRecord {
    /// A fresh record in `verified` status.
    pub fn verified(
        user_id: &str,
        sources: VerificationSources,
        verified_skills: BTreeSet<String>,
        profile_skills: BTreeSet<String>,
        metrics: Option<SkillMetrics>,
        verified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            status: VerificationStatus::Verified,
            verified_skills,
            profile_skills_at_verification: profile_skills,
            sources,
            overall_score: metrics.map(|m| m.overall_score()),
            metrics,
            verified_at,
            invalidated_at: None,
            invalidation_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == VerificationStatus::Verified
    }

    pub fn is_github_sourced(&self) -> bool {
        self.sources.github.is_some()
    }

    /// Move to `invalidated`. Returns false if already invalidated; a record
    /// never returns to `verified`.
    pub fn invalidate(&mut self, reason: InvalidationReason, at: DateTime<Utc>) -> bool {
        if self.status == VerificationStatus::Invalidated {
            return false;
        }
        self.status = VerificationStatus::Invalidated;
        self.invalidated_at = Some(at);
        self.invalidation_reason = Some(reason);
        true
    }

    pub fn trust_level(&self) -> TrustLevel {
        let base = match (&self.sources.github, self.overall_score) {
            (Some(_), Some(score)) => TrustLevel::from_score(score),
            _ => {
                let any_name_match = self
                    .sources
                    .certificates
                    .as_ref()
                    .is_some_and(|certs| certs.iter().any(|c| c.name_match));
                if any_name_match {
                    TrustLevel::Low
                } else {
                    TrustLevel::Minimal
                }
            }
        };
        if self.verified_skills.is_empty() {
            base.min(TrustLevel::Low)
        } else {
            base
        }
    }
}
