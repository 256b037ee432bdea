//! Calendar-specific error types.

use orgcal_auth::AuthError;
use orgcal_core::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalendarError {
    /// No usable credential and the caller did not allow consent.
    #[error("Authentication required")]
    AuthRequired,

    /// The provider rejected the credential.
    #[error("Credential rejected by calendar provider (HTTP {status})")]
    RemoteAuth { status: u16 },

    #[error("Calendar provider unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Calendar provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Sign-in failed: {0}")]
    Auth(AuthError),

    #[error("Local storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CalendarError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthRequired => "Please sign in to your Google account".to_string(),
            Self::RemoteAuth { .. } => {
                "Your session has expired. Please sign in again.".to_string()
            }
            Self::RemoteUnavailable(_) => {
                "Google Calendar is unreachable. Check your connection.".to_string()
            }
            Self::Provider { message, .. } => format!("Calendar error: {}", message),
            Self::PreconditionFailed(msg) => msg.clone(),
            Self::Auth(err) => err.user_message().to_string(),
            Self::Storage(err) => err.user_message().to_string(),
        }
    }

    /// Whether recovering needs the user to go through consent again.
    pub fn needs_interactive_auth(&self) -> bool {
        matches!(self, Self::AuthRequired | Self::RemoteAuth { .. })
    }

    /// Whether the same call may succeed later without any change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }
}

impl From<AuthError> for CalendarError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AuthRequired => Self::AuthRequired,
            AuthError::Network(msg) => Self::RemoteUnavailable(msg),
            other => Self::Auth(other),
        }
    }
}

impl From<reqwest::Error> for CalendarError {
    fn from(err: reqwest::Error) -> Self {
        Self::RemoteUnavailable(err.to_string())
    }
}

/// Outcome of a user-triggered or background operation, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Completed(String),
    AuthenticationNeeded(String),
    /// The operation went through but some items were skipped.
    ItemsFailed { message: String, failed: Vec<String> },
    Failed(String),
}

impl OperationStatus {
    pub fn from_error(err: &CalendarError) -> Self {
        if err.needs_interactive_auth() {
            Self::AuthenticationNeeded(err.user_message())
        } else {
            Self::Failed(err.user_message())
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Completed(msg)
            | Self::AuthenticationNeeded(msg)
            | Self::ItemsFailed { message: msg, .. }
            | Self::Failed(msg) => msg,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}
