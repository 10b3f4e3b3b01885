use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `TeamUp`.
///
/// Returned by command dispatch. Callers match on these to decide whether a
/// failure is user-correctable, retryable, or a trust-boundary violation.
/// Store plumbing keeps using `anyhow::Result` for context chains and lands
/// in `Other` or `VerificationError::Persistence`.
#[derive(Debug, Error)]
pub enum TeamUpError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Verification ────────────────────────────────────────────────────
    #[error("verification: {0}")]
    Verification(#[from] VerificationError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Verification errors ────────────────────────────────────────────────────

/// Failure kinds of a verification attempt.
///
/// `FetchFailed` is retryable by re-running the whole flow; the fetcher only
/// swallows it for rate limits hit mid-pagination.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// Evidence subject does not exist. User-correctable.
    #[error("github user {username} not found")]
    UserNotFound { username: String },

    /// Transient network or service failure.
    #[error("evidence fetch failed: {0}")]
    FetchFailed(String),

    /// Evidence exists but carries no usable signal.
    #[error("no usable evidence: {0}")]
    NoEvidence(String),

    /// OAuth-authenticated account differs from the claimed profile.
    #[error("identity mismatch: claimed {claimed}, authenticated as {authenticated}")]
    IdentityMismatch {
        claimed: String,
        authenticated: String,
    },

    /// Session identity changed while the verification was running.
    #[error("security context changed: expected {expected}, found {}", .found.as_deref().unwrap_or("no session"))]
    SecurityContextChanged {
        expected: String,
        found: Option<String>,
    },

    #[error("invalid github profile url {url}: {reason}")]
    InvalidProfileUrl { url: String, reason: String },

    #[error("persistence: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl VerificationError {
    /// Whether re-invoking the same flow may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed(_))
    }

    /// Whether the failure crossed a trust boundary and requires
    /// re-authentication before another attempt.
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::IdentityMismatch { .. } | Self::SecurityContextChanged { .. }
        )
    }
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, TeamUpError>;
