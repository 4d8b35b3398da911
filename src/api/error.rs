//! Error types for the DocAssist API client.
//!
//! `RefreshFailure` is `Clone` because one failed refresh is delivered to
//! every request that was queued behind it.

use thiserror::Error;

#[cfg(feature = "keychain")]
use super::keychain::KeychainError;

/// Why a token refresh could not produce a new credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("failed to parse refresh response: {0}")]
    Decode(String),

    #[error("refresh abandoned before completion")]
    Abandoned,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered 401; stored credentials have been cleared.
    #[error("session is no longer authorized, please log in again")]
    Unauthorized,

    /// The stored credentials expired and could not be refreshed.
    #[error("session refresh failed: {0}")]
    RefreshFailed(RefreshFailure),

    #[error("{0}")]
    LoginFailed(String),

    #[error("request failed ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to parse response: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "keychain")]
    #[error(transparent)]
    Keychain(#[from] KeychainError),
}

impl ApiError {
    /// Whether the caller has to send the user back through login.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::RefreshFailed(_))
    }
}

impl From<RefreshFailure> for ApiError {
    fn from(failure: RefreshFailure) -> Self {
        ApiError::RefreshFailed(failure)
    }
}
