//! Result of an authentication attempt, as reported by an external authenticator.

use serde::{Deserialize, Serialize};

/// Outcome of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginResult {
    Success,
    /// Credentials accepted, but they expire soon.
    SuccessGracePeriod,
    Fail,
    FailExpired,
    FailLockedOut,
    /// Client and server versions are incompatible.
    FailVersionMismatch,
}

impl LoginResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::SuccessGracePeriod)
    }
}

/// A login result with its optional explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginStatus {
    status: LoginResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    /// Set when the authenticator normalized the username (case, aliases).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_username: Option<String>,
}

impl LoginStatus {
    pub fn new(status: LoginResult, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_username: None,
        }
    }

    pub fn with_updated_username(mut self, username: impl Into<String>) -> Self {
        self.updated_username = Some(username.into());
        self
    }

    pub fn status(&self) -> LoginResult {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn updated_username(&self) -> Option<&str> {
        self.updated_username.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
