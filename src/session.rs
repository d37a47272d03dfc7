//! Per-invocation session context
//!
//! Carries the caller's credentials and identity into the synthesis client and
//! the store. Nothing here is global: two pipeline runs with different sessions
//! never observe each other's token.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session context passed explicitly to collaborators that talk to the outside world
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Identifies one pipeline run in logs and store metadata
    pub id: Uuid,

    /// Bearer token forwarded to remote services, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Session {
    /// Anonymous session with a fresh id
    pub fn anonymous() -> Self {
        Self {
            id: Uuid::new_v4(),
            access_token: None,
        }
    }

    /// Session carrying a bearer token
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            access_token: Some(token.into()),
        }
    }

    /// `Authorization` header value, if a token is present
    pub fn authorization(&self) -> Option<String> {
        self.access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| format!("Bearer {}", t))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}
