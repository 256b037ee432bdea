//! Google identity provider for Calendar access.

use async_trait::async_trait;
use orgcal_core::GoogleConfig;
use serde::Deserialize;

use crate::error::AuthError;
use crate::identity::{IdentityProvider, TokenGrant};
use crate::oauth::{self, OAuth2Config};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

// Calendar read/write plus the signed-in email
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const IDENTITY_SCOPES: [&str; 3] = ["openid", "email", "profile"];

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
}

pub struct GoogleIdentity {
    oauth: OAuth2Config,
    userinfo_url: String,
    http: reqwest::Client,
}

impl GoogleIdentity {
    pub fn new(client_id: String, client_secret: String, callback_port: u16) -> Self {
        let mut scopes: Vec<String> = IDENTITY_SCOPES.iter().map(|s| s.to_string()).collect();
        scopes.push(CALENDAR_SCOPE.to_string());

        Self {
            oauth: OAuth2Config {
                client_id,
                client_secret,
                auth_url: GOOGLE_AUTH_URL.to_string(),
                token_url: GOOGLE_TOKEN_URL.to_string(),
                callback_port,
                scopes,
            },
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &GoogleConfig) -> Self {
        Self::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.callback_port,
        )
    }

    /// Point the user-info lookup somewhere else (tests).
    pub fn with_userinfo_url(mut self, url: &str) -> Self {
        self.userinfo_url = url.to_string();
        self
    }

    pub fn oauth_config(&self) -> &OAuth2Config {
        &self.oauth
    }

    /// Get user info from an access token.
    #[tracing::instrument(skip(self, access_token), level = "info")]
    pub async fn user_info(&self, access_token: &str) -> Result<GoogleUserInfo, AuthError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<GoogleUserInfo>().await?)
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentity {
    async fn request_consent(&self) -> Result<TokenGrant, AuthError> {
        oauth::run_loopback_flow(&self.oauth).await
    }

    async fn user_email(&self, access_token: &str) -> Result<String, AuthError> {
        self.user_info(access_token)
            .await?
            .email
            .ok_or_else(|| AuthError::Provider {
                status: 200,
                message: "User info has no email".to_string(),
            })
    }
}
