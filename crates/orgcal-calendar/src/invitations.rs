//! Locally persisted invitation queue and notification log.
//!
//! Nothing here talks to the provider; the real ACL grant lives in
//! [`SyncEngine::send_invitation`](crate::SyncEngine::send_invitation).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use orgcal_core::{keys, KeyValueStore, KeyValueStoreExt};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Accept,
    Decline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: String,
    pub organization: String,
    pub email: String,
    pub from: Option<String>,
    pub status: InvitationStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteNotification {
    pub id: String,
    pub organization: String,
    pub email: String,
    pub from: Option<String>,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
}

impl InviteNotification {
    fn for_invitation(invitation: &Invitation) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            organization: invitation.organization.clone(),
            email: invitation.email.clone(),
            from: invitation.from.clone(),
            status: invitation.status,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueReceipt {
    pub queued: usize,
    pub invitations: Vec<Invitation>,
}

/// Split a free-text list on whitespace, commas and semicolons and keep
/// tokens shaped like `local@domain.tld`.
pub fn split_emails(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|token| is_email(token))
        .map(str::to_string)
        .collect()
}

fn is_email(token: &str) -> bool {
    let mut parts = token.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    // A dot with at least one character on each side.
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

pub struct InvitationQueue {
    kv: Arc<dyn KeyValueStore>,
}

impl InvitationQueue {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn pending(&self) -> Vec<Invitation> {
        self.kv.get_json_or_default(keys::INVITES)
    }

    pub fn get(&self, id: &str) -> Option<Invitation> {
        self.pending().into_iter().find(|i| i.id == id)
    }

    /// Append one pending invitation per valid address.
    #[tracing::instrument(skip(self, emails, note), level = "info")]
    pub fn queue(
        &self,
        organization: &str,
        emails: &[String],
        note: Option<&str>,
        from: Option<String>,
    ) -> Result<QueueReceipt, CalendarError> {
        let organization = organization.trim();
        if organization.is_empty() {
            return Err(CalendarError::PreconditionFailed(
                "Organization name is required".to_string(),
            ));
        }

        let addresses = split_emails(&emails.join(" "));
        if addresses.is_empty() {
            return Err(CalendarError::PreconditionFailed(
                "No valid email address to invite".to_string(),
            ));
        }

        let note = note.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        let now = Utc::now();
        let created: Vec<Invitation> = addresses
            .into_iter()
            .map(|email| Invitation {
                id: uuid::Uuid::new_v4().to_string(),
                organization: organization.to_string(),
                email,
                from: from.clone(),
                status: InvitationStatus::Pending,
                note: note.clone(),
                created_at: now,
            })
            .collect();

        let mut queue = self.pending();
        queue.extend(created.iter().cloned());
        self.kv.set_json(keys::INVITES, &queue)?;
        self.notify(&created)?;

        tracing::info!("Queued {} invitations", created.len());
        Ok(QueueReceipt {
            queued: created.len(),
            invitations: created,
        })
    }

    /// Accept or decline. The invitation leaves the queue either way.
    pub fn respond(&self, id: &str, response: Response) -> Result<Invitation, CalendarError> {
        let mut queue = self.pending();
        let position = queue
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| CalendarError::PreconditionFailed(format!("No invitation with id {}", id)))?;

        let mut invitation = queue.remove(position);
        invitation.status = match response {
            Response::Accept => InvitationStatus::Accepted,
            Response::Decline => InvitationStatus::Declined,
        };

        self.kv.set_json(keys::INVITES, &queue)?;
        self.notify(std::slice::from_ref(&invitation))?;
        Ok(invitation)
    }

    pub fn remove(&self, id: &str) -> Result<Option<Invitation>, CalendarError> {
        let mut queue = self.pending();
        let Some(position) = queue.iter().position(|i| i.id == id) else {
            return Ok(None);
        };
        let removed = queue.remove(position);
        self.kv.set_json(keys::INVITES, &queue)?;
        Ok(Some(removed))
    }

    /// Notification log, newest first.
    pub fn notifications(&self) -> Vec<InviteNotification> {
        self.kv.get_json_or_default(keys::INVITE_NOTIFS)
    }

    pub fn clear_notifications(&self) -> Result<(), CalendarError> {
        self.kv.remove(keys::INVITE_NOTIFS)?;
        Ok(())
    }

    fn notify(&self, invitations: &[Invitation]) -> Result<(), CalendarError> {
        let mut log: Vec<InviteNotification> = invitations
            .iter()
            .rev()
            .map(InviteNotification::for_invitation)
            .collect();
        log.extend(self.notifications());
        self.kv.set_json(keys::INVITE_NOTIFS, &log)?;
        Ok(())
    }
}
