//! Organizations discovered from the user's calendar list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::client::CalendarClient;
use crate::error::CalendarError;
use crate::label::{LabelConvention, LabelRole};
use crate::types::{AccessRole, RemoteCalendar};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub email: String,
    pub calendar_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub general_calendar_id: Option<String>,
    pub members: Vec<Member>,
    /// The user owns at least one calendar of this organization.
    pub is_owner: bool,
}

impl Organization {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            general_calendar_id: None,
            members: Vec::new(),
            is_owner: false,
        }
    }

    /// Member calendar for `email`, ignoring ASCII case.
    pub fn member(&self, email: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| m.email.eq_ignore_ascii_case(email))
    }
}

/// Result of one discovery pass, split by ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub owned: Vec<Organization>,
    pub shared: Vec<Organization>,
}

impl Directory {
    /// Group calendars by organization name. Unmatched calendars are ignored.
    pub fn from_calendars(calendars: &[RemoteCalendar], convention: &LabelConvention) -> Self {
        let mut groups: Vec<Organization> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for calendar in calendars {
            let Some(label) = convention.parse_organization_label(&calendar.summary) else {
                continue;
            };

            let slot = *index.entry(label.name.clone()).or_insert_with(|| {
                groups.push(Organization::new(&label.name));
                groups.len() - 1
            });
            let org = &mut groups[slot];

            if calendar.access_role == AccessRole::Owner {
                org.is_owner = true;
            }

            match label.role {
                LabelRole::General => {
                    if org.general_calendar_id.is_none() {
                        org.general_calendar_id = Some(calendar.id.clone());
                    } else {
                        tracing::debug!(
                            "Ignoring extra General calendar {} for {}",
                            calendar.id,
                            org.name
                        );
                    }
                }
                LabelRole::Member { email } => org.members.push(Member {
                    email,
                    calendar_id: calendar.id.clone(),
                }),
            }
        }

        let (owned, shared) = groups.into_iter().partition(|o| o.is_owner);
        Self { owned, shared }
    }

    /// Owned organizations first, then shared ones.
    pub fn iter(&self) -> impl Iterator<Item = &Organization> {
        self.owned.iter().chain(self.shared.iter())
    }

    pub fn find(&self, name: &str) -> Option<&Organization> {
        self.iter().find(|o| o.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty() && self.shared.is_empty()
    }
}

/// Read one page of the calendar list and build the directory.
///
/// Performs no writes against the provider.
#[tracing::instrument(skip(client, convention), level = "info")]
pub async fn discover(
    client: &CalendarClient,
    convention: &LabelConvention,
    page_size: u32,
) -> Result<Directory, CalendarError> {
    let calendars = client.list_calendars(page_size).await?;
    let directory = Directory::from_calendars(&calendars, convention);
    tracing::info!(
        "Discovered {} owned and {} shared organizations among {} calendars",
        directory.owned.len(),
        directory.shared.len(),
        calendars.len()
    );
    Ok(directory)
}
