//! Organization calendars: remote client, discovery, local event store,
//! invitations and the fetch-and-merge engine.

pub mod client;
pub mod directory;
pub mod error;
pub mod invitations;
pub mod label;
pub mod selection;
pub mod store;
pub mod sync;
pub mod types;

pub use client::CalendarClient;
pub use directory::{Directory, Member, Organization};
pub use error::{CalendarError, OperationStatus};
pub use invitations::{
    split_emails, Invitation, InvitationQueue, InvitationStatus, InviteNotification,
    QueueReceipt, Response,
};
pub use label::{LabelConvention, LabelRole, OrganizationLabel};
pub use selection::{OrganizationSelection, VisibilitySet};
pub use store::{general_key, member_key, Candidate, Event, EventStore, MergeOutcome};
pub use sync::{
    active_calendars, color_for, month_bounds, Grant, GrantReport, ImportReport,
    LogicalCalendar, OrganizationOptions, SkippedGrant, SyncEngine, SyncOptions,
    PRIMARY_CALENDAR_ID,
};
pub use types::{AccessRole, AclRole, EventStart, RemoteCalendar, RemoteEvent};
