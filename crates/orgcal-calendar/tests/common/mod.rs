//! Shared fixtures for engine integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use orgcal_auth::{AuthError, Credential, CredentialStore, IdentityProvider, TokenGrant};
use orgcal_calendar::{CalendarClient, SyncEngine, SyncOptions};
use orgcal_core::{keys, KeyValueStoreExt, MemoryStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CACHED_TOKEN: &str = "test_token";
pub const CONSENT_TOKEN: &str = "fresh_token";
pub const OWNER_EMAIL: &str = "owner@example.com";

/// Identity provider that grants consent instantly and counts prompts.
pub struct CountingIdentity {
    consents: AtomicUsize,
}

impl CountingIdentity {
    pub fn consents(&self) -> usize {
        self.consents.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for CountingIdentity {
    async fn request_consent(&self) -> Result<TokenGrant, AuthError> {
        self.consents.fetch_add(1, Ordering::SeqCst);
        Ok(TokenGrant {
            access_token: CONSENT_TOKEN.to_string(),
            expires_in: Some(3600),
        })
    }

    async fn user_email(&self, _access_token: &str) -> Result<String, AuthError> {
        Ok(OWNER_EMAIL.to_string())
    }
}

pub struct Harness {
    pub engine: SyncEngine,
    pub kv: Arc<MemoryStore>,
    pub identity: Arc<CountingIdentity>,
}

/// Engine pointed at `server`, optionally with a cached token expiring in
/// `token_ttl` seconds.
pub fn harness(server: &MockServer, token_ttl: Option<i64>) -> Harness {
    let kv = Arc::new(MemoryStore::new());
    if let Some(ttl) = token_ttl {
        kv.set_json(
            keys::TOKEN,
            &Credential {
                access_token: CACHED_TOKEN.to_string(),
                expires_at: Utc::now() + Duration::seconds(ttl),
            },
        )
        .unwrap();
    }

    let identity = Arc::new(CountingIdentity {
        consents: AtomicUsize::new(0),
    });
    let credentials = Arc::new(CredentialStore::new(kv.clone(), identity.clone()));
    let client = CalendarClient::with_base_url(credentials.clone(), &server.uri());
    let options = SyncOptions {
        time_zone: Some(chrono_tz::UTC),
        ..SyncOptions::default()
    };
    let engine = SyncEngine::new(kv.clone(), credentials, client, options);

    Harness {
        engine,
        kv,
        identity,
    }
}

/// Connected harness with a token valid for an hour.
pub fn connected(server: &MockServer) -> Harness {
    harness(server, Some(3600))
}

pub fn calendar(id: &str, summary: &str, role: &str) -> serde_json::Value {
    serde_json::json!({"id": id, "summary": summary, "accessRole": role})
}

pub async fn mount_calendar_list(server: &MockServer, items: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": items })))
        .mount(server)
        .await;
}

pub async fn mount_events(server: &MockServer, calendar_id: &str, items: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/calendars/{}/events", calendar_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": items })))
        .mount(server)
        .await;
}

pub fn all_day(id: &str, summary: &str, date: &str) -> serde_json::Value {
    serde_json::json!({"id": id, "summary": summary, "start": {"date": date}})
}

pub fn timed(id: &str, summary: &str, date_time: &str) -> serde_json::Value {
    serde_json::json!({"id": id, "summary": summary, "start": {"dateTime": date_time}})
}

pub async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}
