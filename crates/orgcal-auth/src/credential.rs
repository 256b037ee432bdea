use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use orgcal_core::{keys, KeyValueStore, KeyValueStoreExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::identity::{IdentityProvider, TokenGrant};

/// A credential this close to expiry is treated as already expired.
pub const EXPIRY_MARGIN_SECS: i64 = 30;

const DEFAULT_TTL_SECS: u64 = 3600;
const MIN_TTL_SECS: u64 = 60;

/// Cached access token with its expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from a fresh grant issued at `now`.
    pub fn from_grant(grant: &TokenGrant, now: DateTime<Utc>) -> Self {
        let ttl = grant.expires_in.unwrap_or(DEFAULT_TTL_SECS).max(MIN_TTL_SECS);
        Self {
            access_token: grant.access_token.clone(),
            expires_at: now + Duration::seconds(ttl as i64),
        }
    }

    /// Whether the token may be handed out at `now`, safety margin included.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }

    pub fn is_usable(&self) -> bool {
        self.is_usable_at(Utc::now())
    }
}

type ConsentFlight = Shared<BoxFuture<'static, Result<Credential, AuthError>>>;

/// Owns the cached credential and the single in-flight consent flow.
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
    identity: Arc<dyn IdentityProvider>,
    cached: Mutex<Option<Credential>>,
    in_flight: Mutex<Option<ConsentFlight>>,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            kv,
            identity,
            cached: Mutex::new(None),
            in_flight: Mutex::new(None),
        }
    }

    /// Return a usable access token.
    ///
    /// A cached token is returned without network or prompt. Otherwise
    /// `interactive = false` fails with [`AuthError::AuthRequired`], and
    /// `interactive = true` joins the in-flight consent flow or starts one.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn acquire(&self, interactive: bool) -> Result<String, AuthError> {
        if let Some(credential) = self.usable() {
            return Ok(credential.access_token);
        }

        if !interactive {
            tracing::debug!("No usable credential and consent not allowed here");
            return Err(AuthError::AuthRequired);
        }

        let flight = self.join_or_start_consent();
        let result = flight.clone().await;
        self.finish_flight(&flight);

        let credential = result?;
        self.remember(credential.clone())?;
        Ok(credential.access_token)
    }

    /// Drop the cached token from memory and persistence.
    pub fn invalidate(&self) -> Result<(), AuthError> {
        *self.cached.lock() = None;
        self.kv.remove(keys::TOKEN)?;
        tracing::info!("Cleared cached credential");
        Ok(())
    }

    /// True when a usable token is cached.
    pub fn is_connected(&self) -> bool {
        self.usable().is_some()
    }

    /// Signed-in email, resolved only when a usable token is already cached.
    pub async fn user_email(&self) -> Option<String> {
        let credential = self.usable()?;
        match self.identity.user_email(&credential.access_token).await {
            Ok(email) => Some(email),
            Err(e) => {
                tracing::warn!("Could not resolve signed-in user: {}", e);
                None
            }
        }
    }

    fn usable(&self) -> Option<Credential> {
        let mut cached = self.cached.lock();

        if cached.is_none() {
            *cached = match self.kv.get_json::<Credential>(keys::TOKEN) {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!("Ignoring unreadable cached credential: {}", e);
                    None
                }
            };
        }

        cached.as_ref().filter(|c| c.is_usable()).cloned()
    }

    fn remember(&self, credential: Credential) -> Result<(), AuthError> {
        self.kv.set_json(keys::TOKEN, &credential)?;
        *self.cached.lock() = Some(credential);
        Ok(())
    }

    fn join_or_start_consent(&self) -> ConsentFlight {
        let mut slot = self.in_flight.lock();

        if let Some(flight) = slot.as_ref() {
            tracing::debug!("Joining in-flight consent flow");
            return flight.clone();
        }

        tracing::info!("Starting interactive consent flow");
        let identity = Arc::clone(&self.identity);
        let flight = async move {
            let grant = identity.request_consent().await?;
            Ok(Credential::from_grant(&grant, Utc::now()))
        }
        .boxed()
        .shared();

        *slot = Some(flight.clone());
        flight
    }

    fn finish_flight(&self, flight: &ConsentFlight) {
        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(flight)) {
            *slot = None;
        }
    }
}
