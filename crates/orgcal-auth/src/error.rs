//! Authentication error types.

use orgcal_core::StorageError;
use thiserror::Error;

/// Errors from acquiring or using a credential.
///
/// `Clone` so a single consent outcome can be handed to every caller
/// waiting on the same flow.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Consent flow failed: {0}")]
    ConsentFailed(String),

    #[error("Consent flow cancelled by user")]
    ConsentCancelled,

    #[error("Identity provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::AuthRequired => "Please sign in to your Google account.",
            AuthError::ConsentFailed(_) => "Sign-in failed. Please try again.",
            AuthError::ConsentCancelled => "Sign-in was cancelled.",
            AuthError::Provider { .. } => "Google sign-in returned an error. Please try again.",
            AuthError::Network(_) => "Network error. Check your connection.",
            AuthError::Storage(_) => "Failed to save credentials. Please try again.",
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Network(err.to_string())
    }
}
