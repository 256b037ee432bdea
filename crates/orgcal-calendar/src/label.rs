//! Naming convention that marks a remote calendar as part of an organization.
//!
//! ```text
//! <prefix><org> · General
//! <prefix><org> · Member · <email>
//! ```

const SEPARATOR: char = '·';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelRole {
    General,
    Member { email: String },
}

/// Organization name and role parsed from a calendar summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationLabel {
    pub name: String,
    pub role: LabelRole,
}

#[derive(Debug, Clone)]
pub struct LabelConvention {
    prefix: String,
}

impl LabelConvention {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parse a calendar summary. `None` for anything that is not a General
    /// or Member calendar under the prefix.
    pub fn parse_organization_label(&self, summary: &str) -> Option<OrganizationLabel> {
        let rest = summary.strip_prefix(self.prefix.as_str())?;
        let parts: Vec<&str> = rest.split(SEPARATOR).map(str::trim).collect();

        let name = parts.first().copied().filter(|n| !n.is_empty())?;
        let role = match parts.get(1) {
            Some(role) if role.eq_ignore_ascii_case("general") => LabelRole::General,
            Some(role) if role.eq_ignore_ascii_case("member") && parts.len() >= 3 => {
                let email = parts[2..].join(" · ");
                if email.is_empty() {
                    return None;
                }
                LabelRole::Member { email }
            }
            _ => return None,
        };

        Some(OrganizationLabel {
            name: name.to_string(),
            role,
        })
    }

    pub fn general_summary(&self, org: &str) -> String {
        format!("{}{} · General", self.prefix, org)
    }

    pub fn member_summary(&self, org: &str, email: &str) -> String {
        format!("{}{} · Member · {}", self.prefix, org, email)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn convention() -> LabelConvention {
        LabelConvention::new("MultiappOrg · ")
    }

    #[test]
    fn test_parse_general() {
        let label = convention()
            .parse_organization_label("MultiappOrg · Team · General")
            .unwrap();
        assert_eq!(label.name, "Team");
        assert_eq!(label.role, LabelRole::General);
    }

    #[test]
    fn test_parse_member() {
        let label = convention()
            .parse_organization_label("MultiappOrg · Team · Member · bob@example.com")
            .unwrap();
        assert_eq!(label.name, "Team");
        assert_eq!(
            label.role,
            LabelRole::Member {
                email: "bob@example.com".into()
            }
        );
    }

    #[test]
    fn test_role_is_case_insensitive_and_trimmed() {
        let label = convention()
            .parse_organization_label("MultiappOrg ·  Famille Martin  ·  GENERAL ")
            .unwrap();
        assert_eq!(label.name, "Famille Martin");
        assert_eq!(label.role, LabelRole::General);

        let label = convention()
            .parse_organization_label("MultiappOrg · Team · member · a@b.co")
            .unwrap();
        assert!(matches!(label.role, LabelRole::Member { .. }));
    }

    #[test]
    fn test_unmatched_summaries() {
        let convention = convention();
        assert!(convention.parse_organization_label("Holidays").is_none());
        assert!(convention.parse_organization_label("Team · General").is_none());
        assert!(convention
            .parse_organization_label("MultiappOrg · Team")
            .is_none());
        assert!(convention
            .parse_organization_label("MultiappOrg · Team · Archive")
            .is_none());
        assert!(convention
            .parse_organization_label("MultiappOrg · Team · Member")
            .is_none());
        assert!(convention
            .parse_organization_label("MultiappOrg ·  · General")
            .is_none());
    }

    #[test]
    fn test_summaries_parse_back() {
        let convention = convention();
        let general = convention.general_summary("Team");
        assert_eq!(general, "MultiappOrg · Team · General");
        assert_eq!(
            convention.parse_organization_label(&general).unwrap().role,
            LabelRole::General
        );

        let member = convention.member_summary("Team", "bob@example.com");
        assert_eq!(member, "MultiappOrg · Team · Member · bob@example.com");
    }
}
