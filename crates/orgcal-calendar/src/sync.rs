//! Sync engine: discovery, fetch-and-merge imports, organization setup
//! and invitation delivery.

use std::sync::Arc;

use chrono::{
    DateTime, Datelike, Duration, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;
use orgcal_auth::{CredentialStore, GoogleIdentity, IdentityProvider};
use orgcal_core::{keys, Config, KeyValueStore, KeyValueStoreExt, OrganizationsConfig, SyncConfig};
use tracing::instrument;

use crate::client::CalendarClient;
use crate::directory::{self, Directory, Member, Organization};
use crate::error::{CalendarError, OperationStatus};
use crate::invitations::{split_emails, Invitation, InvitationQueue, InvitationStatus, QueueReceipt, Response};
use crate::label::LabelConvention;
use crate::selection::{OrganizationSelection, VisibilitySet};
use crate::store::{general_key, member_key, normalize_title, Candidate, Event, EventStore};
use crate::types::{AclRole, RemoteEvent};

/// Calendar id the provider resolves to the signed-in user's own calendar.
pub const PRIMARY_CALENDAR_ID: &str = "primary";

/// Prefix on remote ids imported from the primary calendar.
const PRIMARY_ID_PREFIX: &str = "primary:";

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub label_prefix: String,
    pub calendar_page_size: u32,
    pub event_page_size: u32,
    /// Zone for turning timed events into dates; host zone when `None`.
    pub time_zone: Option<Tz>,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self::from_sections(&config.sync, &config.organizations)
    }

    fn from_sections(sync: &SyncConfig, organizations: &OrganizationsConfig) -> Self {
        Self {
            label_prefix: organizations.label_prefix.clone(),
            calendar_page_size: sync.calendar_page_size,
            event_page_size: sync.event_page_size,
            time_zone: sync.tz(),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_sections(&SyncConfig::default(), &OrganizationsConfig::default())
    }
}

/// One entry of the calendar filter: an organization's General calendar or
/// one member calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalCalendar {
    pub key: String,
    pub organization: String,
    pub label: String,
    pub color: String,
    /// `None` means display-only; nothing is fetched for it.
    pub remote_calendar_id: Option<String>,
}

/// Deterministic CSS color for a calendar key.
pub fn color_for(text: &str) -> String {
    let hash = text
        .encode_utf16()
        .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(u32::from(unit)));
    format!("hsl({}deg 70% 45%)", hash % 360)
}

fn logical_calendars(org: &Organization) -> impl Iterator<Item = LogicalCalendar> + '_ {
    let key = general_key(&org.name);
    let general = LogicalCalendar {
        color: color_for(&key),
        key,
        organization: org.name.clone(),
        label: format!("{} · General", org.name),
        remote_calendar_id: org.general_calendar_id.clone(),
    };

    let members = org.members.iter().map(move |member| {
        let key = member_key(&org.name, &member.email);
        LogicalCalendar {
            color: color_for(&key),
            key,
            organization: org.name.clone(),
            label: format!("{} · {}", org.name, member.email),
            remote_calendar_id: Some(member.calendar_id.clone()),
        }
    });

    std::iter::once(general).chain(members)
}

/// Logical calendars of the selected organizations, owned ones first.
pub fn active_calendars(
    directory: &Directory,
    selection: &OrganizationSelection,
) -> Vec<LogicalCalendar> {
    directory
        .iter()
        .filter(|org| selection.contains(&org.name))
        .flat_map(logical_calendars)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub calendars_fetched: usize,
    pub fetched: usize,
    pub added: Vec<Event>,
    pub matched_by_remote_id: usize,
    pub matched_by_content: usize,
}

impl ImportReport {
    pub fn status(&self) -> OperationStatus {
        OperationStatus::Completed(format!(
            "Imported {} new events from {} calendars",
            self.added.len(),
            self.calendars_fetched
        ))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrganizationOptions {
    /// Also create one calendar per member, shared with that member.
    pub create_personal_calendars: bool,
    /// Ask the provider to email each grantee.
    pub notify_by_email: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub email: String,
    pub calendar_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedGrant {
    pub email: String,
    pub calendar_id: Option<String>,
    pub reason: String,
}

/// What an organization create or invite actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantReport {
    pub organization: String,
    pub general_calendar_id: String,
    pub created_general: bool,
    pub personal_calendars: Vec<Member>,
    pub granted: Vec<Grant>,
    pub skipped: Vec<SkippedGrant>,
}

impl GrantReport {
    fn new(organization: &str, general_calendar_id: &str, created_general: bool) -> Self {
        Self {
            organization: organization.to_string(),
            general_calendar_id: general_calendar_id.to_string(),
            created_general,
            personal_calendars: Vec::new(),
            granted: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn status(&self) -> OperationStatus {
        let message = format!(
            "{}: {} access grants, {} personal calendars",
            self.organization,
            self.granted.len(),
            self.personal_calendars.len()
        );
        if self.skipped.is_empty() {
            OperationStatus::Completed(message)
        } else {
            OperationStatus::ItemsFailed {
                message: format!("{} ({} skipped)", message, self.skipped.len()),
                failed: self.skipped.iter().map(|s| s.email.clone()).collect(),
            }
        }
    }
}

/// Engine context. Owns every piece of local state and the remote client;
/// hosts keep one per signed-in profile.
pub struct SyncEngine {
    kv: Arc<dyn KeyValueStore>,
    credentials: Arc<CredentialStore>,
    client: CalendarClient,
    options: SyncOptions,
    convention: LabelConvention,
    directory: Directory,
    events: EventStore,
    selection: OrganizationSelection,
    visibility: VisibilitySet,
    invitations: InvitationQueue,
}

impl SyncEngine {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        credentials: Arc<CredentialStore>,
        client: CalendarClient,
        options: SyncOptions,
    ) -> Self {
        let directory: Directory = kv.get_json_or_default(keys::ORGS);
        Self {
            convention: LabelConvention::new(options.label_prefix.clone()),
            events: EventStore::load(kv.clone()),
            selection: OrganizationSelection::load(kv.clone()),
            visibility: VisibilitySet::load(kv.clone()),
            invitations: InvitationQueue::new(kv.clone()),
            directory,
            kv,
            credentials,
            client,
            options,
        }
    }

    /// Engine backed by Google sign-in as configured.
    pub fn from_config(config: &Config, kv: Arc<dyn KeyValueStore>) -> Self {
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(GoogleIdentity::from_config(&config.google));
        Self::with_identity(config, kv, identity)
    }

    pub fn with_identity(
        config: &Config,
        kv: Arc<dyn KeyValueStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let credentials = Arc::new(CredentialStore::new(kv.clone(), identity));
        let client = CalendarClient::new(credentials.clone());
        Self::new(kv, credentials, client, SyncOptions::from_config(config))
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    pub fn selection(&self) -> &OrganizationSelection {
        &self.selection
    }

    pub fn visibility(&self) -> &VisibilitySet {
        &self.visibility
    }

    pub fn invitations(&self) -> &InvitationQueue {
        &self.invitations
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    // Connection

    /// Sign in, prompting if no usable token is cached.
    #[instrument(skip(self), level = "info")]
    pub async fn connect(&self) -> Result<(), CalendarError> {
        self.authorize(true).await
    }

    pub fn sign_out(&self) -> Result<(), CalendarError> {
        self.credentials.invalidate()?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.credentials.is_connected()
    }

    /// Signed-in email, only when already connected.
    pub async fn whoami(&self) -> Option<String> {
        self.credentials.user_email().await
    }

    async fn authorize(&self, interactive: bool) -> Result<(), CalendarError> {
        self.credentials.acquire(interactive).await?;
        Ok(())
    }

    // Discovery and selection

    /// Rebuild the directory from the calendar list and cache it.
    #[instrument(skip(self), level = "info")]
    pub async fn discover(&mut self, interactive: bool) -> Result<&Directory, CalendarError> {
        self.authorize(interactive).await?;
        let directory =
            directory::discover(&self.client, &self.convention, self.options.calendar_page_size)
                .await?;

        if let Err(e) = self.kv.set_json(keys::ORGS, &directory) {
            tracing::warn!("Failed to cache organizations: {}", e);
        }
        self.directory = directory;
        self.show_active_calendars()?;
        Ok(&self.directory)
    }

    pub fn select_organization(&mut self, name: &str, selected: bool) -> Result<(), CalendarError> {
        self.selection.set_selected(name, selected)?;
        self.show_active_calendars()
    }

    pub fn active_calendars(&self) -> Vec<LogicalCalendar> {
        active_calendars(&self.directory, &self.selection)
    }

    pub fn set_visible(&mut self, calendar_key: &str, visible: bool) -> Result<(), CalendarError> {
        self.visibility.set_visible(calendar_key, visible)?;
        Ok(())
    }

    fn show_active_calendars(&mut self) -> Result<(), CalendarError> {
        let calendars = self.active_calendars();
        self.visibility
            .initialize_if_empty(calendars.iter().map(|c| c.key.as_str()))?;
        Ok(())
    }

    // Local events

    pub fn visible_events_on(&self, date: NaiveDate) -> Vec<&Event> {
        self.events.events_on(date, &self.visibility)
    }

    pub fn visible_events_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Event> {
        self.events.events_between(start, end, &self.visibility)
    }

    pub fn add_event(
        &mut self,
        calendar_key: &str,
        date: NaiveDate,
        title: &str,
    ) -> Result<Event, CalendarError> {
        self.events.add(calendar_key, date, title)
    }

    pub fn edit_event(&mut self, id: &str, title: &str) -> Result<Event, CalendarError> {
        self.events.edit_title(id, title)
    }

    pub fn delete_event(&mut self, id: &str) -> Result<Event, CalendarError> {
        self.events.delete(id)
    }

    // Imports

    /// Fetch every active calendar for `[start, end]` and merge the result.
    ///
    /// Calendars are fetched one after another; the first failure aborts the
    /// import before anything is merged.
    #[instrument(skip(self), level = "info")]
    pub async fn import_range(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        interactive: bool,
    ) -> Result<ImportReport, CalendarError> {
        if self.selection.is_empty() {
            return Err(CalendarError::PreconditionFailed(
                "Select at least one organization".to_string(),
            ));
        }
        let (time_min, time_max) = self.window(start, end)?;
        self.authorize(interactive).await?;

        let mut candidates = Vec::new();
        let mut calendars_fetched = 0;
        for calendar in self.active_calendars() {
            let Some(remote_id) = calendar.remote_calendar_id.as_deref() else {
                continue;
            };
            let events = self
                .client
                .list_events(remote_id, time_min, time_max, self.options.event_page_size)
                .await?;
            calendars_fetched += 1;
            candidates.extend(
                events
                    .into_iter()
                    .map(|event| self.candidate(&calendar.key, event, "")),
            );
        }

        self.merge(calendars_fetched, candidates)
    }

    /// Import a whole calendar month.
    pub async fn import_month(
        &mut self,
        year: i32,
        month: u32,
        interactive: bool,
    ) -> Result<ImportReport, CalendarError> {
        let (first, last) = month_bounds(year, month)?;
        self.import_range(first, last, interactive).await
    }

    /// Import the user's primary calendar into the General calendar of the
    /// one selected organization. The organization must be in the directory
    /// with a remote General calendar.
    #[instrument(skip(self), level = "info")]
    pub async fn import_primary(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        interactive: bool,
    ) -> Result<ImportReport, CalendarError> {
        let organization = match self.selection.names().collect::<Vec<_>>().as_slice() {
            [only] => only.to_string(),
            [] => {
                return Err(CalendarError::PreconditionFailed(
                    "Select the organization to import your calendar into".to_string(),
                ))
            }
            _ => {
                return Err(CalendarError::PreconditionFailed(
                    "Select exactly one organization to import your calendar into".to_string(),
                ))
            }
        };
        let has_general = self
            .directory
            .find(&organization)
            .is_some_and(|org| org.general_calendar_id.is_some());
        if !has_general {
            return Err(CalendarError::PreconditionFailed(format!(
                "{} is not a known organization with a General calendar",
                organization
            )));
        }
        let (time_min, time_max) = self.window(start, end)?;
        self.authorize(interactive).await?;

        let key = general_key(&organization);
        let events = self
            .client
            .list_events(
                PRIMARY_CALENDAR_ID,
                time_min,
                time_max,
                self.options.event_page_size,
            )
            .await?;
        let candidates = events
            .into_iter()
            .map(|event| self.candidate(&key, event, PRIMARY_ID_PREFIX))
            .collect();

        self.merge(1, candidates)
    }

    fn candidate(&self, calendar_key: &str, event: RemoteEvent, id_prefix: &str) -> Candidate {
        Candidate {
            calendar_key: calendar_key.to_string(),
            date: event.start.calendar_date(self.options.time_zone),
            title: normalize_title(event.summary.as_deref()),
            remote_id: format!("{}{}", id_prefix, event.id),
        }
    }

    fn merge(
        &mut self,
        calendars_fetched: usize,
        candidates: Vec<Candidate>,
    ) -> Result<ImportReport, CalendarError> {
        let fetched = candidates.len();
        let outcome = self.events.merge(candidates)?;
        tracing::info!(
            "Import fetched {} events from {} calendars, {} new",
            fetched,
            calendars_fetched,
            outcome.added.len()
        );
        Ok(ImportReport {
            calendars_fetched,
            fetched,
            added: outcome.added,
            matched_by_remote_id: outcome.matched_by_remote_id,
            matched_by_content: outcome.matched_by_content,
        })
    }

    fn window(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), CalendarError> {
        if end < start {
            return Err(CalendarError::PreconditionFailed(
                "The range ends before it starts".to_string(),
            ));
        }
        let last_moment = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).ok_or_else(|| {
            CalendarError::PreconditionFailed("Invalid end of day".to_string())
        })?;
        Ok((
            to_utc(start.and_time(NaiveTime::MIN), self.options.time_zone),
            to_utc(end.and_time(last_moment), self.options.time_zone),
        ))
    }

    // Organizations

    /// Create an organization: General calendar, writer access for every
    /// member and, optionally, one personal calendar per member.
    #[instrument(skip(self, emails), level = "info")]
    pub async fn create_organization(
        &mut self,
        name: &str,
        emails: &[String],
        options: OrganizationOptions,
        interactive: bool,
    ) -> Result<GrantReport, CalendarError> {
        let name = organization_name(name)?;
        let emails = split_emails(&emails.join(" "));
        self.authorize(interactive).await?;

        let general = self
            .client
            .create_calendar(&self.convention.general_summary(&name))
            .await?;
        self.add_to_calendar_list(&general.id).await;

        let mut report = GrantReport::new(&name, &general.id, true);
        self.grant_members(&mut report, &emails, options, None).await?;

        self.rediscover().await;
        Ok(report)
    }

    /// Share an organization with more members. The General calendar is
    /// looked up by name first and only created when missing.
    #[instrument(skip(self, emails), level = "info")]
    pub async fn invite_members(
        &mut self,
        name: &str,
        emails: &[String],
        options: OrganizationOptions,
        interactive: bool,
    ) -> Result<GrantReport, CalendarError> {
        let name = organization_name(name)?;
        let emails = split_emails(&emails.join(" "));
        if emails.is_empty() {
            return Err(CalendarError::PreconditionFailed(
                "No valid email address to invite".to_string(),
            ));
        }
        self.authorize(interactive).await?;

        let current = directory::discover(
            &self.client,
            &self.convention,
            self.options.calendar_page_size,
        )
        .await?;
        let existing = current.find(&name);

        let mut report = match existing.and_then(|o| o.general_calendar_id.as_deref()) {
            Some(general_id) => GrantReport::new(&name, general_id, false),
            None => {
                let general = self
                    .client
                    .create_calendar(&self.convention.general_summary(&name))
                    .await?;
                self.add_to_calendar_list(&general.id).await;
                GrantReport::new(&name, &general.id, true)
            }
        };

        self.grant_members(&mut report, &emails, options, existing)
            .await?;

        self.rediscover().await;
        Ok(report)
    }

    async fn grant_members(
        &self,
        report: &mut GrantReport,
        emails: &[String],
        options: OrganizationOptions,
        existing: Option<&Organization>,
    ) -> Result<(), CalendarError> {
        let general_id = report.general_calendar_id.clone();
        for email in emails {
            self.grant(report, &general_id, email, options.notify_by_email)
                .await?;
        }

        if !options.create_personal_calendars {
            return Ok(());
        }

        for email in emails {
            let calendar_id = match existing.and_then(|org| org.member(email)) {
                Some(member) => {
                    tracing::debug!("Reusing personal calendar {} for {}", member.calendar_id, email);
                    member.calendar_id.clone()
                }
                None => {
                    let summary = self.convention.member_summary(&report.organization, email);
                    match self.client.create_calendar(&summary).await {
                        Ok(calendar) => {
                            self.add_to_calendar_list(&calendar.id).await;
                            calendar.id
                        }
                        Err(e) if e.needs_interactive_auth() => return Err(e),
                        Err(e) => {
                            tracing::warn!("Skipping personal calendar for {}: {}", email, e);
                            report.skipped.push(SkippedGrant {
                                email: email.clone(),
                                calendar_id: None,
                                reason: e.user_message(),
                            });
                            continue;
                        }
                    }
                }
            };

            report.personal_calendars.push(Member {
                email: email.clone(),
                calendar_id: calendar_id.clone(),
            });
            self.grant(report, &calendar_id, email, options.notify_by_email)
                .await?;
        }
        Ok(())
    }

    /// Grant writer access. Failures other than a rejected credential are
    /// recorded and skipped.
    async fn grant(
        &self,
        report: &mut GrantReport,
        calendar_id: &str,
        email: &str,
        notify: bool,
    ) -> Result<(), CalendarError> {
        match self
            .client
            .set_access_control_entry(calendar_id, AclRole::Writer, email, notify)
            .await
        {
            Ok(()) => {
                report.granted.push(Grant {
                    email: email.to_string(),
                    calendar_id: calendar_id.to_string(),
                });
                Ok(())
            }
            Err(e) if e.needs_interactive_auth() => Err(e),
            Err(e) => {
                tracing::warn!("Skipping access grant for {} on {}: {}", email, calendar_id, e);
                report.skipped.push(SkippedGrant {
                    email: email.to_string(),
                    calendar_id: Some(calendar_id.to_string()),
                    reason: e.user_message(),
                });
                Ok(())
            }
        }
    }

    async fn add_to_calendar_list(&self, calendar_id: &str) {
        if let Err(e) = self.client.add_calendar_to_user_list(calendar_id).await {
            tracing::warn!("Could not add {} to the calendar list: {}", calendar_id, e);
        }
    }

    async fn rediscover(&mut self) {
        if let Err(e) = self.discover(false).await {
            tracing::warn!("Directory refresh after change failed: {}", e);
        }
    }

    // Invitations

    /// Queue invitations locally. The sender is the signed-in user when a
    /// token is cached; no prompt is triggered for it.
    pub async fn queue_invitations(
        &mut self,
        organization: &str,
        emails: &[String],
        note: Option<&str>,
    ) -> Result<QueueReceipt, CalendarError> {
        let from = self.whoami().await;
        self.invitations.queue(organization, emails, note, from)
    }

    /// Answer a queued invitation. Accepting selects the organization.
    pub fn respond_invitation(
        &mut self,
        id: &str,
        response: Response,
    ) -> Result<Invitation, CalendarError> {
        let invitation = self.invitations.respond(id, response)?;
        if invitation.status == InvitationStatus::Accepted {
            self.select_organization(&invitation.organization, true)?;
        }
        Ok(invitation)
    }

    /// Grant the invitee writer access on the organization's General
    /// calendar, then drop the invitation.
    #[instrument(skip(self), level = "info")]
    pub async fn send_invitation(
        &mut self,
        id: &str,
        notify: bool,
    ) -> Result<Invitation, CalendarError> {
        let invitation = self.invitations.get(id).ok_or_else(|| {
            CalendarError::PreconditionFailed(format!("No invitation with id {}", id))
        })?;
        self.authorize(true).await?;

        let general_id = match self.general_calendar_id(&invitation.organization) {
            Some(general_id) => general_id,
            None => {
                self.discover(false).await?;
                self.general_calendar_id(&invitation.organization)
                    .ok_or_else(|| {
                        CalendarError::PreconditionFailed(format!(
                            "No General calendar found for {}",
                            invitation.organization
                        ))
                    })?
            }
        };

        self.client
            .set_access_control_entry(&general_id, AclRole::Writer, &invitation.email, notify)
            .await?;
        self.invitations.remove(id)?;

        tracing::info!("Shared {} with {}", invitation.organization, invitation.email);
        Ok(invitation)
    }

    fn general_calendar_id(&self, organization: &str) -> Option<String> {
        self.directory
            .find(organization)
            .and_then(|o| o.general_calendar_id.clone())
    }

    // Background

    /// Periodic reconciliation entry point for the host. Never prompts.
    #[instrument(skip(self), level = "info")]
    pub async fn background_refresh(&mut self, today: NaiveDate) -> OperationStatus {
        match self.refresh_month(today).await {
            Ok(Some(report)) => report.status(),
            Ok(None) => OperationStatus::Completed("No organization selected".to_string()),
            Err(e) => {
                tracing::warn!("Background refresh failed: {}", e);
                OperationStatus::from_error(&e)
            }
        }
    }

    async fn refresh_month(
        &mut self,
        today: NaiveDate,
    ) -> Result<Option<ImportReport>, CalendarError> {
        self.discover(false).await?;
        if self.selection.is_empty() {
            return Ok(None);
        }
        let (first, last) = month_bounds(today.year(), today.month())?;
        self.import_range(first, last, false).await.map(Some)
    }
}

fn organization_name(name: &str) -> Result<String, CalendarError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CalendarError::PreconditionFailed(
            "Organization name is required".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), CalendarError> {
    let invalid = || CalendarError::PreconditionFailed(format!("Invalid month {}-{}", year, month));
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(invalid)?;
    Ok((first, last))
}

/// Interpret a wall-clock time in `tz` (or the host zone).
fn to_utc(naive: NaiveDateTime, tz: Option<Tz>) -> DateTime<Utc> {
    match tz {
        Some(tz) => resolve_local(&tz, naive),
        None => resolve_local(&Local, naive),
    }
}

/// Longest run of skipped wall-clock minutes searched past a DST gap.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Ambiguous times take the earlier instant. A time skipped by a DST gap
/// moves to the first valid minute after the gap.
fn resolve_local<Z: TimeZone>(zone: &Z, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(dt) = zone.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }

    let minute = naive
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(naive);
    (1..=MAX_GAP_MINUTES)
        .map(|step| minute + Duration::minutes(step))
        .find_map(|candidate| zone.from_local_datetime(&candidate).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::types::{AccessRole, RemoteCalendar};
    use orgcal_core::MemoryStore;

    fn directory() -> Directory {
        let calendars = vec![
            RemoteCalendar {
                id: "G2".into(),
                summary: "MultiappOrg · Club · General".into(),
                access_role: AccessRole::Reader,
                is_primary: false,
            },
            RemoteCalendar {
                id: "G1".into(),
                summary: "MultiappOrg · Team · General".into(),
                access_role: AccessRole::Owner,
                is_primary: false,
            },
            RemoteCalendar {
                id: "M1".into(),
                summary: "MultiappOrg · Team · Member · bob@example.com".into(),
                access_role: AccessRole::Owner,
                is_primary: false,
            },
        ];
        Directory::from_calendars(&calendars, &LabelConvention::new("MultiappOrg · "))
    }

    #[test]
    fn test_color_is_deterministic_hsl() {
        assert_eq!(color_for("Team::General"), color_for("Team::General"));
        assert!(color_for("Team::General").starts_with("hsl("));
        assert!(color_for("Team::General").ends_with("deg 70% 45%)"));
        // "ab" hashes to 97 * 31 + 98 = 3105, 3105 % 360 = 225
        assert_eq!(color_for("ab"), "hsl(225deg 70% 45%)");
    }

    #[test]
    fn test_active_calendars_follow_selection() {
        let kv = Arc::new(MemoryStore::new());
        let mut selection = OrganizationSelection::load(kv);
        let directory = directory();

        assert!(active_calendars(&directory, &selection).is_empty());

        selection.set_selected("Club", true).unwrap();
        selection.set_selected("Team", true).unwrap();
        let calendars = active_calendars(&directory, &selection);

        let keys: Vec<&str> = calendars.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["Team::General", "Team::member:bob@example.com", "Club::General"]
        );
        assert_eq!(calendars[0].remote_calendar_id.as_deref(), Some("G1"));
        assert_eq!(calendars[1].remote_calendar_id.as_deref(), Some("M1"));
        assert_eq!(calendars[0].color, color_for("Team::General"));
    }

    #[test]
    fn test_general_without_remote_id_is_display_only() {
        let calendars = vec![RemoteCalendar {
            id: "M9".into(),
            summary: "MultiappOrg · Solo · Member · a@b.co".into(),
            access_role: AccessRole::Reader,
            is_primary: false,
        }];
        let directory =
            Directory::from_calendars(&calendars, &LabelConvention::new("MultiappOrg · "));
        let kv = Arc::new(MemoryStore::new());
        let mut selection = OrganizationSelection::load(kv);
        selection.set_selected("Solo", true).unwrap();

        let calendars = active_calendars(&directory, &selection);
        assert_eq!(calendars.len(), 2);
        assert!(calendars[0].remote_calendar_id.is_none());
    }

    #[test]
    fn test_month_bounds() {
        let (first, last) = month_bounds(2024, 2).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (_, last) = month_bounds(2024, 12).unwrap();
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());

        assert!(matches!(
            month_bounds(2024, 13),
            Err(CalendarError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn test_to_utc_uses_zone() {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_time(NaiveTime::MIN);
        let utc = to_utc(naive, Some(chrono_tz::Europe::Paris));
        assert_eq!(utc.to_rfc3339(), "2024-02-29T23:00:00+00:00");
    }

    #[test]
    fn test_to_utc_moves_past_dst_gap() {
        // 02:30 does not exist in Paris on 2024-03-31; clocks jump to 03:00 CEST.
        let skipped = NaiveDate::from_ymd_opt(2024, 3, 31)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let utc = to_utc(skipped, Some(chrono_tz::Europe::Paris));
        assert_eq!(utc.to_rfc3339(), "2024-03-31T01:00:00+00:00");

        let skipped = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_milli_opt(2, 15, 59, 999)
            .unwrap();
        let utc = to_utc(skipped, Some(chrono_tz::America::New_York));
        assert_eq!(utc.to_rfc3339(), "2024-03-10T07:00:00+00:00");
    }

    #[test]
    fn test_to_utc_takes_earlier_of_ambiguous_times() {
        // 02:30 happens twice in Paris on 2024-10-27.
        let ambiguous = NaiveDate::from_ymd_opt(2024, 10, 27)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let utc = to_utc(ambiguous, Some(chrono_tz::Europe::Paris));
        assert_eq!(utc.to_rfc3339(), "2024-10-27T00:30:00+00:00");
    }

    #[test]
    fn test_grant_report_status() {
        let mut report = GrantReport::new("Team", "G1", true);
        report.granted.push(Grant {
            email: "a@b.co".into(),
            calendar_id: "G1".into(),
        });
        assert!(report.status().is_success());

        report.skipped.push(SkippedGrant {
            email: "c@d.co".into(),
            calendar_id: Some("G1".into()),
            reason: "Calendar error: Invalid scope".into(),
        });
        match report.status() {
            OperationStatus::ItemsFailed { failed, .. } => assert_eq!(failed, vec!["c@d.co"]),
            other => panic!("unexpected status {:?}", other),
        }
    }
}
