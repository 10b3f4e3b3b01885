//! Verification record manager.
//!
//! Runs one evidence path per attempt, reconciles inferred against declared
//! skills and owns the record lifecycle: `verified` → `invalidated`, never
//! back. At most one record per user is `verified` once writes for that user
//! are serialized by the caller.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::certificate::CertificateAnalyzer;
use super::evidence::{CertificateEvidence, EvidenceSnapshot, EvidenceSource, GitHubEvidence};
use super::feed::RecordSubscription;
use super::github::{EvidenceFetcher, username_from_profile_url};
use super::inference::{infer_from_snapshot, match_skills};
use super::metrics::SkillMetrics;
use super::record::{
    CertificateSource, GitHubSource, InvalidationReason, VerificationRecord, VerificationSources,
    VerificationStatus,
};
use super::session::SessionContext;
use super::store::VerificationStore;
use crate::config::{NoEvidencePolicy, VerificationConfig};
use crate::error::VerificationError;
use crate::profile::{DeclaredSkill, skill_names};

type VerifyResult<T> = std::result::Result<T, VerificationError>;

/// Result of the profile-edit hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileEditOutcome {
    /// Nothing verified to compare against.
    NoActiveRecord,
    /// Declared skills still match the verified snapshot.
    Unchanged,
    /// The active record was invalidated; the user must verify again.
    Invalidated { record_id: String },
}

impl ProfileEditOutcome {
    pub fn requires_reverification(&self) -> bool {
        matches!(self, Self::Invalidated { .. })
    }
}

/// What one evidence path produced, before reconciliation.
struct GatheredEvidence {
    sources: VerificationSources,
    inferred: BTreeSet<String>,
    metrics: Option<SkillMetrics>,
    has_signal: bool,
}

pub struct VerificationManager {
    store: Arc<dyn VerificationStore>,
    fetcher: Arc<dyn EvidenceFetcher>,
    analyzer: Arc<dyn CertificateAnalyzer>,
    session: Arc<dyn SessionContext>,
    config: VerificationConfig,
}

impl VerificationManager {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        fetcher: Arc<dyn EvidenceFetcher>,
        analyzer: Arc<dyn CertificateAnalyzer>,
        session: Arc<dyn SessionContext>,
        config: VerificationConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            analyzer,
            session,
            config,
        }
    }

    /// Run one verification attempt and persist its record.
    ///
    /// Prior verified records of the user are superseded. Evidence gathering is
    /// bounded by the configured timeout, which surfaces as `FetchFailed`;
    /// persistence runs to completion once evidence is in hand.
    pub async fn verify(
        &self,
        user_id: &str,
        source: &EvidenceSource,
        declared: &[DeclaredSkill],
    ) -> VerifyResult<VerificationRecord> {
        self.ensure_session(user_id)?;
        info!(user_id, source = source.kind(), "Starting verification");

        let now = Utc::now();
        let declared_names = skill_names(declared);
        let gathered = self.gather(user_id, source, &declared_names, now).await?;

        if !gathered.has_signal {
            match self.config.no_evidence {
                NoEvidencePolicy::Reject => {
                    warn!(user_id, source = source.kind(), "No usable evidence, rejecting");
                    return Err(VerificationError::NoEvidence(format!(
                        "{} evidence carried no usable signal",
                        source.kind()
                    )));
                }
                NoEvidencePolicy::Persist => {
                    warn!(
                        user_id,
                        source = source.kind(),
                        "No usable evidence, persisting record with no verified skills"
                    );
                }
            }
        }

        let verified_skills = match_skills(&declared_names, &gathered.inferred);
        let profile_skills = declared_names.iter().map(|s| s.trim().to_string()).collect();
        let record = VerificationRecord::verified(
            user_id,
            gathered.sources,
            verified_skills,
            profile_skills,
            gathered.metrics,
            now,
        );
        ensure_oauth_verified(&record)?;

        // The session may have changed while evidence was being fetched.
        self.ensure_session(user_id)?;
        self.supersede_active(user_id, now).await?;
        self.store.insert(&record).await?;

        info!(
            user_id,
            record_id = record.id.as_str(),
            verified = record.verified_skills.len(),
            declared = record.profile_skills_at_verification.len(),
            score = record.overall_score,
            "Verification recorded"
        );
        Ok(record)
    }

    async fn gather(
        &self,
        user_id: &str,
        source: &EvidenceSource,
        declared_names: &[String],
        now: DateTime<Utc>,
    ) -> VerifyResult<GatheredEvidence> {
        let timeout = self.config.timeout();
        let gathering = async {
            match source {
                EvidenceSource::GitHub(evidence) => self.gather_github(evidence, now).await,
                EvidenceSource::Certificates(evidence) => {
                    self.gather_certificates(evidence, declared_names).await
                }
            }
        };
        match tokio::time::timeout(timeout, gathering).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    user_id,
                    source = source.kind(),
                    timeout_secs = timeout.as_secs(),
                    "Evidence gathering timed out"
                );
                Err(VerificationError::FetchFailed(format!(
                    "verification timed out after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    async fn gather_github(
        &self,
        evidence: &GitHubEvidence,
        now: DateTime<Utc>,
    ) -> VerifyResult<GatheredEvidence> {
        let claimed = username_from_profile_url(&evidence.profile_url)?;
        let token = evidence.access_token.trim();
        if token.is_empty() {
            return Err(VerificationError::FetchFailed(
                "an OAuth access token is required".into(),
            ));
        }

        let login = self.fetcher.authenticated_login(token).await?;
        if !login.eq_ignore_ascii_case(&claimed) {
            warn!(
                claimed = claimed.as_str(),
                authenticated = login.as_str(),
                "GitHub identity mismatch"
            );
            return Err(VerificationError::IdentityMismatch {
                claimed,
                authenticated: login,
            });
        }

        let repos = self.fetcher.fetch_repositories(&login, Some(token)).await?;
        let snapshot = EvidenceSnapshot::from_repos(&repos, now);
        let metrics = SkillMetrics::from_snapshot(&snapshot, now);
        let inferred = infer_from_snapshot(&snapshot);
        debug!(
            username = login.as_str(),
            repos = snapshot.repo_count,
            languages = snapshot.languages.len(),
            topics = snapshot.topics.len(),
            inferred = inferred.len(),
            "GitHub evidence analyzed"
        );

        Ok(GatheredEvidence {
            has_signal: !snapshot.is_empty(),
            sources: VerificationSources {
                github: Some(GitHubSource {
                    username: login,
                    profile_url: evidence.profile_url.trim().to_string(),
                    oauth_verified: true,
                    inferred_skills: inferred.clone(),
                    analyzed_at: now,
                }),
                certificates: None,
            },
            inferred,
            metrics: Some(metrics),
        })
    }

    async fn gather_certificates(
        &self,
        evidence: &CertificateEvidence,
        declared_names: &[String],
    ) -> VerifyResult<GatheredEvidence> {
        let mut certificates = Vec::with_capacity(evidence.uploads.len());
        let mut inferred = BTreeSet::new();

        for upload in &evidence.uploads {
            let analysis = self
                .analyzer
                .analyze(upload, &evidence.profile_name, declared_names)
                .await
                .map_err(|e| {
                    VerificationError::FetchFailed(format!(
                        "certificate {} could not be analyzed: {e:#}",
                        upload.file_name
                    ))
                })?;

            debug!(
                file = upload.file_name.as_str(),
                name_match = analysis.name_match,
                skills = analysis.inferred_skills.len(),
                "Certificate analyzed"
            );
            if analysis.name_match {
                inferred.extend(analysis.inferred_skills.iter().cloned());
            }
            certificates.push(CertificateSource {
                file_name: upload.file_name.clone(),
                extracted_name: analysis.extracted_name,
                name_match: analysis.name_match,
                course_topics: analysis.course_topics,
                inferred_skills: analysis.inferred_skills,
            });
        }

        Ok(GatheredEvidence {
            has_signal: certificates.iter().any(|c| c.name_match),
            sources: VerificationSources {
                github: None,
                certificates: Some(certificates),
            },
            inferred,
            metrics: None,
        })
    }

    fn ensure_session(&self, user_id: &str) -> VerifyResult<()> {
        let current = self.session.current_user_id();
        if current.as_deref() == Some(user_id) {
            return Ok(());
        }
        warn!(
            user_id,
            current = current.as_deref().unwrap_or("none"),
            "Session identity changed"
        );
        Err(VerificationError::SecurityContextChanged {
            expected: user_id.to_string(),
            found: current,
        })
    }

    async fn supersede_active(&self, user_id: &str, at: DateTime<Utc>) -> VerifyResult<usize> {
        self.invalidate_matching(user_id, InvalidationReason::Superseded, at, |_| true)
            .await
    }

    async fn invalidate_matching(
        &self,
        user_id: &str,
        reason: InvalidationReason,
        at: DateTime<Utc>,
        predicate: impl Fn(&VerificationRecord) -> bool,
    ) -> VerifyResult<usize> {
        let mut changed: Vec<VerificationRecord> = self
            .store
            .find_by_user_status(user_id, VerificationStatus::Verified)
            .await?
            .into_iter()
            .filter(|record| predicate(record))
            .collect();
        changed.retain_mut(|record| record.invalidate(reason, at));

        if !changed.is_empty() {
            self.store.update_batch(&changed).await?;
            info!(user_id, count = changed.len(), %reason, "Records invalidated");
        }
        Ok(changed.len())
    }

    /// Invalidate every active record of the user. Idempotent; returns how
    /// many records changed.
    pub async fn invalidate(
        &self,
        user_id: &str,
        reason: InvalidationReason,
    ) -> VerifyResult<usize> {
        self.invalidate_matching(user_id, reason, Utc::now(), |_| true)
            .await
    }

    /// Newest verified record of the user.
    pub async fn get_active(&self, user_id: &str) -> VerifyResult<Option<VerificationRecord>> {
        Ok(self
            .store
            .latest_by_user_status(user_id, VerificationStatus::Verified)
            .await?)
    }

    /// Profile-edit hook: invalidate the active record when declared skills
    /// no longer match what was verified.
    pub async fn apply_profile_edit(
        &self,
        user_id: &str,
        skills: &[DeclaredSkill],
    ) -> VerifyResult<ProfileEditOutcome> {
        let Some(active) = self.get_active(user_id).await? else {
            return Ok(ProfileEditOutcome::NoActiveRecord);
        };
        if !skills_drifted(&skill_names(skills), &active) {
            return Ok(ProfileEditOutcome::Unchanged);
        }

        info!(user_id, record_id = active.id.as_str(), "Declared skills drifted");
        self.invalidate(user_id, InvalidationReason::ProfileEdited)
            .await?;
        Ok(ProfileEditOutcome::Invalidated {
            record_id: active.id,
        })
    }

    /// Expire active records older than the configured max age.
    pub async fn expire_stale(&self, user_id: &str, now: DateTime<Utc>) -> VerifyResult<usize> {
        let cutoff = now - Duration::days(i64::from(self.config.max_age_days));
        self.invalidate_matching(user_id, InvalidationReason::Expired, now, |record| {
            record.verified_at < cutoff
        })
        .await
    }

    /// All records of the user, newest first.
    pub async fn history(&self, user_id: &str) -> VerifyResult<Vec<VerificationRecord>> {
        Ok(self.store.list_for_user(user_id).await?)
    }

    /// Follow changes to the user's records, including writes made by other
    /// processes sharing the database.
    pub async fn subscribe(&self, user_id: &str) -> VerifyResult<RecordSubscription> {
        Ok(self.store.subscribe(user_id).await?)
    }
}

/// Whether current declared skills differ from the snapshot taken at
/// verification. Case-insensitive and order-independent.
pub fn skills_drifted<S: AsRef<str>>(current: &[S], record: &VerificationRecord) -> bool {
    fn fold<'a>(skills: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
        skills
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fold(current.iter().map(AsRef::as_ref))
        != fold(record.profile_skills_at_verification.iter().map(String::as_str))
}

fn ensure_oauth_verified(record: &VerificationRecord) -> VerifyResult<()> {
    match &record.sources.github {
        Some(github) if !github.oauth_verified => Err(VerificationError::Persistence(
            anyhow::anyhow!("refusing to persist a GitHub record without OAuth verification"),
        )),
        _ => Ok(()),
    }
}
