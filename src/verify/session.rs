//! Session identity seam, consulted to detect identity changes mid-flow.

use std::sync::RwLock;

/// Source of the currently signed-in user.
pub trait SessionContext: Send + Sync {
    /// Id of the signed-in user, or `None` when signed out.
    fn current_user_id(&self) -> Option<String>;
}

/// Session pinned to one user, switchable for sign-out/sign-in.
#[derive(Debug, Default)]
pub struct FixedSession {
    user_id: RwLock<Option<String>>,
}

impl FixedSession {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: RwLock::new(Some(user_id.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Replace the signed-in user.
    pub fn switch_to(&self, user_id: Option<String>) {
        if let Ok(mut guard) = self.user_id.write() {
            *guard = user_id;
        }
    }
}

impl SessionContext for FixedSession {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.read().ok().and_then(|guard| guard.clone())
    }
}
