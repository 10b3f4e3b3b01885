use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Upper bound on repository pages fetched per verification.
pub const MAX_REPO_PAGES: u32 = 5;
/// Largest page size the GitHub API accepts.
pub const MAX_PER_PAGE: u32 = 100;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub certificate: CertificateConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub verification: VerificationConfig,
}

// ── GitHub ────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_github_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_github_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_github_per_page")]
    pub per_page: u32,
    #[serde(default = "default_github_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_github_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_github_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// OAuth/personal token used unless `verify github --token-stdin` is given.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_github_api_base_url() -> String {
    "https://api.github.com".into()
}
fn default_github_user_agent() -> String {
    concat!("TeamUp-SkillVerify/", env!("CARGO_PKG_VERSION")).into()
}
fn default_github_max_pages() -> u32 {
    MAX_REPO_PAGES
}
fn default_github_per_page() -> u32 {
    MAX_PER_PAGE
}
fn default_github_max_retries() -> u32 {
    2
}
fn default_github_retry_base_ms() -> u64 {
    250
}
fn default_github_request_timeout_secs() -> u64 {
    10
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_github_api_base_url(),
            user_agent: default_github_user_agent(),
            max_pages: default_github_max_pages(),
            per_page: default_github_per_page(),
            max_retries: default_github_max_retries(),
            retry_base_ms: default_github_retry_base_ms(),
            request_timeout_secs: default_github_request_timeout_secs(),
            token: None,
        }
    }
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_base_url", &self.api_base_url)
            .field("user_agent", &self.user_agent)
            .field("max_pages", &self.max_pages)
            .field("per_page", &self.per_page)
            .field("max_retries", &self.max_retries)
            .field("retry_base_ms", &self.retry_base_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

// ── Certificate OCR ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// OCR collaborator endpoint. Unset means certificates must be supplied
    /// as already-extracted text.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_certificate_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_certificate_timeout_secs() -> u64 {
    20
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_certificate_timeout_secs(),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// How often `watch` re-reads the database for writes from other
    /// processes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_database_path() -> String {
    "~/.teamup/verifications.db".into()
}
fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl StorageConfig {
    /// Database path with `~` expanded.
    pub fn resolved_database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database_path).into_owned())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── Verification ──────────────────────────────────────────────────

/// What to do when the evidence path yields no usable signal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NoEvidencePolicy {
    /// Persist a record with an empty verified-skill set.
    #[default]
    Persist,
    /// Fail with `NoEvidence` and persist nothing.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Whole-operation timeout for one verification attempt.
    #[serde(default = "default_verification_timeout_secs")]
    pub timeout_secs: u64,
    /// Verified records older than this are expired by `expire_stale`.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    #[serde(default)]
    pub no_evidence: NoEvidencePolicy,
}

fn default_verification_timeout_secs() -> u64 {
    20
}
fn default_max_age_days() -> u32 {
    365
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_verification_timeout_secs(),
            max_age_days: default_max_age_days(),
            no_evidence: NoEvidencePolicy::default(),
        }
    }
}

impl VerificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Loading ───────────────────────────────────────────────────────

impl Config {
    /// Load `~/.teamup/config.toml`, writing defaults on first run.
    pub fn load_or_init() -> Result<Self, ConfigError> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .ok_or_else(|| ConfigError::Load("could not find home directory".into()))?;
        Self::load_or_init_in(&home.join(".teamup"))
    }

    /// Load or create `config.toml` inside `dir`.
    pub fn load_or_init_in(dir: &Path) -> Result<Self, ConfigError> {
        let config_path = dir.join("config.toml");

        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)?;
            let mut config: Config = toml::from_str(&contents).map_err(|e| {
                ConfigError::Load(format!("{}: {e}", config_path.display()))
            })?;
            config.config_path.clone_from(&config_path);
            config
        } else {
            let config = Self {
                config_path: config_path.clone(),
                ..Self::default()
            };
            config.save()?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("TEAMUP_GITHUB_TOKEN") {
            if !token.is_empty() {
                self.github.token = Some(token);
            }
        }

        if let Ok(api) = std::env::var("TEAMUP_GITHUB_API_URL") {
            if !api.is_empty() {
                self.github.api_base_url = api;
            }
        }

        if let Ok(db) = std::env::var("TEAMUP_DATABASE_PATH") {
            if !db.is_empty() {
                self.storage.database_path = db;
            }
        }

        if let Ok(endpoint) = std::env::var("TEAMUP_OCR_ENDPOINT") {
            if !endpoint.is_empty() {
                self.certificate.endpoint = Some(endpoint);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_REPO_PAGES).contains(&self.github.max_pages) {
            return Err(ConfigError::Validation(format!(
                "github.max_pages must be within 1..={MAX_REPO_PAGES}, got {}",
                self.github.max_pages
            )));
        }
        if !(1..=MAX_PER_PAGE).contains(&self.github.per_page) {
            return Err(ConfigError::Validation(format!(
                "github.per_page must be within 1..={MAX_PER_PAGE}, got {}",
                self.github.per_page
            )));
        }
        if self.verification.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "verification.timeout_secs must be positive".into(),
            ));
        }
        if self.storage.database_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.database_path must not be empty".into(),
            ));
        }
        if self.storage.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "storage.poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Load(format!("failed to serialize config: {e}")))?;
        fs::write(&self.config_path, toml_str)?;
        Ok(())
    }
}
