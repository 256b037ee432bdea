use async_trait::async_trait;

use crate::error::AuthError;

/// Token issued by the identity provider after consent.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime reported by the provider, in seconds.
    pub expires_in: Option<u64>,
}

/// Identity provider seam.
///
/// `request_consent` may open a browser; it is only ever reached from
/// [`CredentialStore::acquire`](crate::CredentialStore::acquire) with
/// `interactive = true`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Run the interactive consent flow and return a fresh token.
    async fn request_consent(&self) -> Result<TokenGrant, AuthError>;

    /// Resolve the signed-in principal's email address.
    async fn user_email(&self, access_token: &str) -> Result<String, AuthError>;
}
