//! Well-known keys in the local key-value store.

/// Local event collection.
pub const EVENTS: &str = "agenda:events:multiorg:v1";

/// Calendar keys currently shown.
pub const VISIBLE: &str = "agenda:visible:multiorg:v1";

/// Organization names the user checked.
pub const SELECTED_ORGS: &str = "agenda:selectedOrgs:v1";

/// Cached access token and its expiry.
pub const TOKEN: &str = "agenda:gcal:token";

/// Last discovered organizations, for offline display.
pub const ORGS: &str = "agenda:orgs:v1";

/// Queued invitations.
pub const INVITES: &str = "agenda:org:invites:v1";

/// Notifications about queued and answered invitations.
pub const INVITE_NOTIFS: &str = "agenda:org:invite-notifs:v1";
