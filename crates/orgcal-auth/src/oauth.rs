use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use tokio::sync::oneshot;
use warp::Filter;

use crate::error::AuthError;
use crate::identity::TokenGrant;

/// How long the loopback server waits for the browser to come back.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// OAuth2 configuration
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    /// Client ID from OAuth provider
    pub client_id: String,

    /// Client secret from OAuth provider
    pub client_secret: String,

    /// Authorization endpoint URL
    pub auth_url: String,

    /// Token endpoint URL
    pub token_url: String,

    /// Loopback port the redirect URI points at
    pub callback_port: u16,

    /// Scopes to request
    pub scopes: Vec<String>,
}

impl OAuth2Config {
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.callback_port)
    }

    fn client(&self) -> Result<BasicClient> {
        let client = BasicClient::new(
            ClientId::new(self.client_id.clone()),
            Some(ClientSecret::new(self.client_secret.clone())),
            AuthUrl::new(self.auth_url.clone()).context("Invalid auth URL")?,
            Some(TokenUrl::new(self.token_url.clone()).context("Invalid token URL")?),
        )
        .set_redirect_uri(RedirectUrl::new(self.redirect_uri()).context("Invalid redirect URI")?);

        Ok(client)
    }
}

/// Authorization request ready to be opened in a browser.
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_token: CsrfToken,
    pub pkce_verifier: PkceCodeVerifier,
}

/// Build the authorization URL with CSRF state and a PKCE challenge.
pub fn authorization_request(config: &OAuth2Config) -> Result<AuthorizationRequest> {
    let client = config.client()?;
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let mut auth_request = client.authorize_url(CsrfToken::new_random);
    for scope in &config.scopes {
        auth_request = auth_request.add_scope(Scope::new(scope.clone()));
    }

    let (url, csrf_token) = auth_request.set_pkce_challenge(pkce_challenge).url();

    Ok(AuthorizationRequest {
        url: url.to_string(),
        csrf_token,
        pkce_verifier,
    })
}

/// Run the full consent flow: browser, loopback callback, code exchange.
#[tracing::instrument(skip(config), fields(port = config.callback_port), level = "info")]
pub async fn run_loopback_flow(config: &OAuth2Config) -> Result<TokenGrant, AuthError> {
    let request = authorization_request(config).map_err(consent_failed)?;
    let params = wait_for_callback(config.callback_port, &request.url).await?;

    if params.get("error").is_some() {
        tracing::info!("Consent denied in browser");
        return Err(AuthError::ConsentCancelled);
    }

    let state = params.get("state").cloned().unwrap_or_default();
    if state != *request.csrf_token.secret() {
        return Err(AuthError::ConsentFailed("CSRF token mismatch".to_string()));
    }

    let code = params
        .get("code")
        .cloned()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::ConsentFailed("No authorization code in callback".to_string()))?;

    exchange_code(config, code, request.pkce_verifier)
        .await
        .map_err(consent_failed)
}

async fn wait_for_callback(port: u16, auth_url: &str) -> Result<HashMap<String, String>, AuthError> {
    let (tx, rx) = oneshot::channel::<HashMap<String, String>>();
    let tx = Arc::new(tokio::sync::Mutex::new(Some(tx)));
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let routes = warp::get()
        .and(warp::path("callback"))
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::any().map(move || tx.clone()))
        .and_then(
            |params: HashMap<String, String>,
             tx: Arc<tokio::sync::Mutex<Option<oneshot::Sender<HashMap<String, String>>>>>| async move {
                if let Some(sender) = tx.lock().await.take() {
                    let _ = sender.send(params);
                }

                Ok::<_, warp::Rejection>(warp::reply::html(
                    "<html><body><h1>Authorization complete</h1><p>You can close this window.</p></body></html>",
                ))
            },
        );

    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(([127, 0, 0, 1], port), async {
            let _ = shutdown_rx.await;
        })
        .map_err(|e| AuthError::ConsentFailed(format!("Callback port {} unavailable: {}", port, e)))?;
    tokio::spawn(server);
    tracing::debug!("Listening for OAuth callback on {}", addr);

    tracing::info!("Opening browser for authorization");
    if let Err(e) = webbrowser::open(auth_url) {
        let _ = shutdown_tx.send(());
        return Err(AuthError::ConsentFailed(format!("Failed to open browser: {}", e)));
    }

    let outcome = tokio::time::timeout(CALLBACK_TIMEOUT, rx).await;
    let _ = shutdown_tx.send(());

    match outcome {
        Ok(Ok(params)) => Ok(params),
        Ok(Err(_)) => Err(AuthError::ConsentFailed(
            "Callback server stopped before a response arrived".to_string(),
        )),
        Err(_) => Err(AuthError::ConsentCancelled),
    }
}

async fn exchange_code(
    config: &OAuth2Config,
    code: String,
    pkce_verifier: PkceCodeVerifier,
) -> Result<TokenGrant> {
    let token = config
        .client()?
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(pkce_verifier)
        .request_async(async_http_client)
        .await
        .context("Failed to exchange authorization code")?;

    Ok(TokenGrant {
        access_token: token.access_token().secret().clone(),
        expires_in: token.expires_in().map(|d| d.as_secs()),
    })
}

fn consent_failed(err: anyhow::Error) -> AuthError {
    AuthError::ConsentFailed(format!("{:#}", err))
}
