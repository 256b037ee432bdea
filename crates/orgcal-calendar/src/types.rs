//! Calendar API types and data structures.

use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

/// Calendar list entry as seen by the sync engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCalendar {
    pub id: String,
    pub summary: String,
    pub access_role: AccessRole,
    pub is_primary: bool,
}

/// Calendar access role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessRole {
    Owner,
    Writer,
    #[default]
    Reader,
    FreeBusyReader,
}

impl AccessRole {
    fn parse(role: Option<&str>) -> Self {
        match role.map(str::to_ascii_lowercase).as_deref() {
            Some("owner") => Self::Owner,
            Some("writer") => Self::Writer,
            Some("freebusyreader") => Self::FreeBusyReader,
            _ => Self::Reader,
        }
    }
}

/// Role granted through an access control entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclRole {
    Reader,
    Writer,
    Owner,
}

impl AclRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Writer => "writer",
            Self::Owner => "owner",
        }
    }
}

/// Start of an event: a bare date for all-day events, an instant otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStart {
    Date(NaiveDate),
    Instant(DateTime<FixedOffset>),
}

impl EventStart {
    /// Calendar date the event belongs to, in `tz` or the host zone.
    pub fn calendar_date(&self, tz: Option<Tz>) -> NaiveDate {
        match self {
            Self::Date(date) => *date,
            Self::Instant(instant) => match tz {
                Some(tz) => instant.with_timezone(&tz).date_naive(),
                None => instant.with_timezone(&Local).date_naive(),
            },
        }
    }
}

/// Non-cancelled event instance decoded from the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: EventStart,
}

// API Response Types

/// Google Calendar API event response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: Option<ApiEventTime>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
}

/// API response for event list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListResponse {
    #[serde(default)]
    pub items: Vec<ApiEvent>,
    pub next_page_token: Option<String>,
}

/// API response for calendar list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListResponse {
    #[serde(default)]
    pub items: Vec<ApiCalendar>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCalendar {
    pub id: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub primary: bool,
    pub access_role: Option<String>,
}

/// Body of `POST /calendars`.
#[derive(Debug, Serialize)]
pub struct NewCalendar<'a> {
    pub summary: &'a str,
}

/// Body of `POST /users/me/calendarList`.
#[derive(Debug, Serialize)]
pub struct CalendarListInsert<'a> {
    pub id: &'a str,
}

/// Body of `POST /calendars/{id}/acl`.
#[derive(Debug, Serialize)]
pub struct AclRule<'a> {
    pub role: &'static str,
    pub scope: AclScope<'a>,
}

#[derive(Debug, Serialize)]
pub struct AclScope<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: &'a str,
}

/// Provider error envelope: `{"error": {"message": ..}}`.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub message: Option<String>,
}

impl From<ApiCalendar> for RemoteCalendar {
    fn from(api: ApiCalendar) -> Self {
        Self {
            access_role: AccessRole::parse(api.access_role.as_deref()),
            id: api.id,
            summary: api.summary.unwrap_or_default(),
            is_primary: api.primary,
        }
    }
}

impl RemoteEvent {
    /// Decode one provider event.
    ///
    /// Cancelled instances yield `Ok(None)`. A live event without a
    /// bare date or RFC 3339 start is a provider error.
    pub fn from_api(api: ApiEvent) -> Result<Option<Self>, CalendarError> {
        if api.status.as_deref() == Some("cancelled") {
            return Ok(None);
        }

        let start = api
            .start
            .as_ref()
            .and_then(parse_event_start)
            .ok_or_else(|| CalendarError::Provider {
                status: 200,
                message: format!("Event {} has no usable start", api.id),
            })?;

        Ok(Some(Self {
            id: api.id,
            summary: api.summary,
            start,
        }))
    }
}

fn parse_event_start(api: &ApiEventTime) -> Option<EventStart> {
    if let Some(dt_str) = &api.date_time {
        return DateTime::parse_from_rfc3339(dt_str)
            .ok()
            .map(EventStart::Instant);
    }
    api.date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(EventStart::Date)
}
