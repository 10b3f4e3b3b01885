pub mod certificate;
pub mod evidence;
pub mod feed;
pub mod github;
pub mod inference;
pub mod manager;
pub mod metrics;
pub mod record;
pub mod session;
pub mod store;

pub use certificate::{
    CertificateAnalysis, CertificateAnalyzer, ExtractedTextAnalyzer, HttpCertificateAnalyzer,
    analyze_certificate_text,
};
pub use evidence::{
    CertificateEvidence, CertificateUpload, EvidenceSnapshot, EvidenceSource, GitHubEvidence,
    RepoMeta,
};
pub use feed::{ChangeLog, DEFAULT_POLL_INTERVAL, RecordChange, RecordFeed, RecordSubscription};
pub use github::{EvidenceFetcher, GitHubFetcher, username_from_profile_url};
pub use inference::{infer_skills, match_skills, normalize_skill};
pub use manager::{ProfileEditOutcome, VerificationManager, skills_drifted};
pub use metrics::SkillMetrics;
pub use record::{
    CertificateSource, GitHubSource, InvalidationReason, TrustLevel, VerificationRecord,
    VerificationSources, VerificationStatus,
};
pub use session::{FixedSession, SessionContext};
pub use store::{SqliteVerificationStore, VerificationStore};
