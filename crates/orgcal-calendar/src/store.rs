//! Local event store: the single source of truth for displayed events.
//!
//! Every mutation persists the next event list before it replaces the
//! in-memory copy.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use orgcal_core::{keys, KeyValueStore, KeyValueStoreExt};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;
use crate::selection::VisibilitySet;

pub const UNTITLED: &str = "(untitled)";

/// Key of an organization's General calendar: `<org>::General`.
pub fn general_key(org: &str) -> String {
    format!("{}::General", org)
}

/// Key of a member calendar: `<org>::member:<email>`.
pub fn member_key(org: &str, email: &str) -> String {
    format!("{}::member:{}", org, email)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub calendar_key: String,
    pub date: NaiveDate,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl Event {
    fn signature(&self) -> (&str, NaiveDate, &str) {
        (&self.calendar_key, self.date, &self.title)
    }
}

/// Normalized remote event waiting to be merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub calendar_key: String,
    pub date: NaiveDate,
    pub title: String,
    pub remote_id: String,
}

impl Candidate {
    fn signature(&self) -> (&str, NaiveDate, &str) {
        (&self.calendar_key, self.date, &self.title)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: Vec<Event>,
    pub matched_by_remote_id: usize,
    pub matched_by_content: usize,
}

/// Trim a remote title, falling back to [`UNTITLED`].
pub fn normalize_title(summary: Option<&str>) -> String {
    match summary.map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => UNTITLED.to_string(),
    }
}

pub struct EventStore {
    kv: Arc<dyn KeyValueStore>,
    events: Vec<Event>,
}

impl EventStore {
    /// Load persisted events. Unreadable data starts an empty store.
    pub fn load(kv: Arc<dyn KeyValueStore>) -> Self {
        let events: Vec<Event> = kv.get_json_or_default(keys::EVENTS);
        tracing::debug!("Loaded {} events", events.len());
        Self { kv, events }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn get(&self, id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Add a user-created event with no remote identity.
    pub fn add(
        &mut self,
        calendar_key: &str,
        date: NaiveDate,
        title: &str,
    ) -> Result<Event, CalendarError> {
        let title = required_title(title)?;
        if calendar_key.trim().is_empty() {
            return Err(CalendarError::PreconditionFailed(
                "Choose a calendar for the event".to_string(),
            ));
        }

        let event = Event {
            id: new_local_id(),
            calendar_key: calendar_key.to_string(),
            date,
            title,
            remote_id: None,
        };
        if self.has_local_duplicate(&event, None) {
            return Err(CalendarError::PreconditionFailed(
                "An identical event already exists on that day".to_string(),
            ));
        }

        let mut next = self.events.clone();
        next.push(event.clone());
        self.commit(next)?;
        Ok(event)
    }

    /// Change an event's title. Remote identity is kept, so a later import
    /// does not bring the old title back.
    pub fn edit_title(&mut self, id: &str, title: &str) -> Result<Event, CalendarError> {
        let title = required_title(title)?;
        let position = self.position(id)?;

        let mut edited = self.events[position].clone();
        edited.title = title;
        if self.has_local_duplicate(&edited, Some(id)) {
            return Err(CalendarError::PreconditionFailed(
                "An identical event already exists on that day".to_string(),
            ));
        }

        let mut next = self.events.clone();
        next[position] = edited.clone();
        self.commit(next)?;
        Ok(edited)
    }

    pub fn delete(&mut self, id: &str) -> Result<Event, CalendarError> {
        let position = self.position(id)?;
        let mut next = self.events.clone();
        let removed = next.remove(position);
        self.commit(next)?;
        Ok(removed)
    }

    /// Merge remote candidates.
    ///
    /// A candidate is skipped when its remote id is already stored, or when
    /// an event without remote id has the same calendar key, date and title.
    /// Everything else is appended and the result persisted in one write.
    #[tracing::instrument(skip(self, candidates), fields(candidates = candidates.len()), level = "debug")]
    pub fn merge(&mut self, candidates: Vec<Candidate>) -> Result<MergeOutcome, CalendarError> {
        let mut known_remote: HashSet<String> = self
            .events
            .iter()
            .filter_map(|e| e.remote_id.clone())
            .collect();
        let local_signatures: HashSet<(String, NaiveDate, String)> = self
            .events
            .iter()
            .filter(|e| e.remote_id.is_none())
            .map(|e| (e.calendar_key.clone(), e.date, e.title.clone()))
            .collect();

        let mut outcome = MergeOutcome::default();
        for candidate in candidates {
            if known_remote.contains(&candidate.remote_id) {
                outcome.matched_by_remote_id += 1;
                continue;
            }
            let (key, date, title) = candidate.signature();
            if local_signatures.contains(&(key.to_string(), date, title.to_string())) {
                outcome.matched_by_content += 1;
                continue;
            }

            known_remote.insert(candidate.remote_id.clone());
            outcome.added.push(Event {
                id: new_local_id(),
                calendar_key: candidate.calendar_key,
                date: candidate.date,
                title: candidate.title,
                remote_id: Some(candidate.remote_id),
            });
        }

        if !outcome.added.is_empty() {
            let mut next = self.events.clone();
            next.extend(outcome.added.iter().cloned());
            self.commit(next)?;
        }

        tracing::debug!(
            "Merged {} new events ({} known by id, {} by content)",
            outcome.added.len(),
            outcome.matched_by_remote_id,
            outcome.matched_by_content
        );
        Ok(outcome)
    }

    /// Visible events on one day, sorted by calendar key.
    pub fn events_on(&self, date: NaiveDate, visibility: &VisibilitySet) -> Vec<&Event> {
        let mut events: Vec<&Event> = self
            .events
            .iter()
            .filter(|e| e.date == date && visibility.contains(&e.calendar_key))
            .collect();
        events.sort_by(|a, b| a.calendar_key.cmp(&b.calendar_key));
        events
    }

    /// Visible events in `[start, end]`, sorted by date then calendar key.
    pub fn events_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        visibility: &VisibilitySet,
    ) -> Vec<&Event> {
        let mut events: Vec<&Event> = self
            .events
            .iter()
            .filter(|e| e.date >= start && e.date <= end && visibility.contains(&e.calendar_key))
            .collect();
        events.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.calendar_key.cmp(&b.calendar_key))
        });
        events
    }

    fn position(&self, id: &str) -> Result<usize, CalendarError> {
        self.events
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| CalendarError::PreconditionFailed(format!("No event with id {}", id)))
    }

    fn has_local_duplicate(&self, event: &Event, except: Option<&str>) -> bool {
        event.remote_id.is_none()
            && self.events.iter().any(|e| {
                e.remote_id.is_none()
                    && Some(e.id.as_str()) != except
                    && e.signature() == event.signature()
            })
    }

    fn commit(&mut self, next: Vec<Event>) -> Result<(), CalendarError> {
        self.kv.set_json(keys::EVENTS, &next)?;
        self.events = next;
        Ok(())
    }
}

fn required_title(title: &str) -> Result<String, CalendarError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CalendarError::PreconditionFailed(
            "Event title cannot be empty".to_string(),
        ));
    }
    Ok(title.to_string())
}

fn new_local_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
