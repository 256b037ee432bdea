//! Google Calendar API client.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use orgcal_auth::CredentialStore;
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::instrument;

use crate::error::CalendarError;
use crate::types::*;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

pub struct CalendarClient {
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
    base_url: String,
}

impl CalendarClient {
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self::with_base_url(credentials, CALENDAR_API_BASE)
    }

    pub fn with_base_url(credentials: Arc<CredentialStore>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Bearer token for the next call. Never prompts.
    async fn token(&self) -> Result<String, CalendarError> {
        Ok(self.credentials.acquire(false).await?)
    }

    /// List the user's calendars, one bounded page.
    #[instrument(skip(self), level = "info")]
    pub async fn list_calendars(
        &self,
        max_results: u32,
    ) -> Result<Vec<RemoteCalendar>, CalendarError> {
        let token = self.token().await?;
        let url = format!(
            "{}/users/me/calendarList?maxResults={}",
            self.base_url, max_results
        );

        let response = self.client.get(&url).bearer_auth(&token).send().await?;

        let resp: CalendarListResponse = self.handle_response(response).await?;
        if resp.next_page_token.is_some() {
            tracing::debug!("Calendar list truncated at {} entries", max_results);
        }
        Ok(resp.items.into_iter().map(RemoteCalendar::from).collect())
    }

    /// List event instances overlapping `[time_min, time_max]`, ordered by
    /// start. Cancelled instances are dropped during decoding.
    #[instrument(skip(self), level = "info")]
    pub async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<RemoteEvent>, CalendarError> {
        let token = self.token().await?;
        let url = format!(
            "{}/calendars/{}/events?timeMin={}&timeMax={}&singleEvents=true&orderBy=startTime&maxResults={}",
            self.base_url,
            urlencoding::encode(calendar_id),
            urlencoding::encode(&time_min.to_rfc3339_opts(SecondsFormat::Millis, true)),
            urlencoding::encode(&time_max.to_rfc3339_opts(SecondsFormat::Millis, true)),
            max_results,
        );

        let response = self.client.get(&url).bearer_auth(&token).send().await?;

        let resp: EventListResponse = self.handle_response(response).await?;
        let mut events = Vec::with_capacity(resp.items.len());
        for item in resp.items {
            if let Some(event) = RemoteEvent::from_api(item)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Create a secondary calendar owned by the signed-in user.
    #[instrument(skip(self), level = "info")]
    pub async fn create_calendar(&self, summary: &str) -> Result<RemoteCalendar, CalendarError> {
        let token = self.token().await?;
        let url = format!("{}/calendars", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&NewCalendar { summary })
            .send()
            .await?;

        let api: ApiCalendar = self.handle_response(response).await?;
        let mut calendar = RemoteCalendar::from(api);
        calendar.access_role = AccessRole::Owner;
        Ok(calendar)
    }

    /// Make a calendar show up in the user's calendar list.
    #[instrument(skip(self), level = "info")]
    pub async fn add_calendar_to_user_list(&self, calendar_id: &str) -> Result<(), CalendarError> {
        let token = self.token().await?;
        let url = format!("{}/users/me/calendarList", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&CalendarListInsert { id: calendar_id })
            .send()
            .await?;

        let _: IgnoredAny = self.handle_response(response).await?;
        Ok(())
    }

    /// Grant `role` on a calendar to a user, optionally emailing them.
    #[instrument(skip(self), level = "info")]
    pub async fn set_access_control_entry(
        &self,
        calendar_id: &str,
        role: AclRole,
        email: &str,
        notify: bool,
    ) -> Result<(), CalendarError> {
        let token = self.token().await?;
        let url = format!(
            "{}/calendars/{}/acl?sendNotifications={}",
            self.base_url,
            urlencoding::encode(calendar_id),
            notify,
        );

        let rule = AclRule {
            role: role.as_str(),
            scope: AclScope {
                kind: "user",
                value: email,
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&rule)
            .send()
            .await?;

        let _: IgnoredAny = self.handle_response(response).await?;
        Ok(())
    }

    /// Helper to handle API responses and errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CalendarError> {
        let status = response.status();

        if status.is_success() {
            return response.json().await.map_err(|e| CalendarError::Provider {
                status: status.as_u16(),
                message: format!("JSON parse error: {}", e),
            });
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or(text);

        let err = error_for_status(status, message);
        if matches!(err, CalendarError::RemoteAuth { .. }) {
            // A rejected token must not be handed out again.
            if let Err(e) = self.credentials.invalidate() {
                tracing::warn!("Failed to drop rejected credential: {}", e);
            }
        }
        Err(err)
    }
}

/// Map a non-2xx status to the error taxonomy.
pub fn error_for_status(status: StatusCode, message: String) -> CalendarError {
    match status.as_u16() {
        401 => CalendarError::RemoteAuth { status: 401 },
        408 | 429 => CalendarError::RemoteUnavailable(format!("HTTP {}: {}", status, message)),
        code if status.is_server_error() => {
            CalendarError::RemoteUnavailable(format!("HTTP {}: {}", code, message))
        }
        code => CalendarError::Provider {
            status: code,
            message,
        },
    }
}
