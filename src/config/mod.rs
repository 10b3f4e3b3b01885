pub mod schema;

pub use schema::{
    CertificateConfig, Config, GitHubConfig, MAX_PER_PAGE, MAX_REPO_PAGES, NoEvidencePolicy,
    StorageConfig, VerificationConfig,
};
