//! Credential lifecycle for the remote calendar provider.
//!
//! Holds only short-lived access tokens; no refresh token is ever stored.

pub mod credential;
pub mod error;
pub mod google;
pub mod identity;
pub mod oauth;

pub use credential::{Credential, CredentialStore, EXPIRY_MARGIN_SECS};
pub use error::AuthError;
pub use google::GoogleIdentity;
pub use identity::{IdentityProvider, TokenGrant};
pub use oauth::OAuth2Config;
