use std::fmt::{self, Write as _};

use chrono::{
    format::{Item, StrftimeItems},
    NaiveDate,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{DatePatternError, EligibilityError};

/// Pattern used to render dates when a template carries no pattern of its own.
pub const ISO_DATE_PATTERN: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Volunteers,
    Roles,
    Shifts,
    Managers,
    EmailTemplate,
    EventProperties,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 6] = [
        CollectionKind::Volunteers,
        CollectionKind::Roles,
        CollectionKind::Shifts,
        CollectionKind::Managers,
        CollectionKind::EmailTemplate,
        CollectionKind::EventProperties,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CollectionKind::Volunteers => "volunteers",
            CollectionKind::Roles => "roles",
            CollectionKind::Shifts => "shifts",
            CollectionKind::Managers => "managers",
            CollectionKind::EmailTemplate => "email_template",
            CollectionKind::EventProperties => "event_properties",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value persisted as part of one of the canonical collections.
pub trait Record: Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned {
    const KIND: CollectionKind;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Record for Role {
    const KIND: CollectionKind = CollectionKind::Roles;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volunteer {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub roles: Vec<Role>,
}

fn default_active() -> bool {
    true
}

impl Volunteer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: String::new(),
            phone: String::new(),
            notes: String::new(),
            active: true,
            roles: Vec::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Drops every role not present in `canonical`. Returns whether anything was removed.
    pub fn retain_roles(&mut self, canonical: &[Role]) -> bool {
        retain_known(&mut self.roles, canonical)
    }
}

impl fmt::Display for Volunteer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Record for Volunteer {
    const KIND: CollectionKind = CollectionKind::Volunteers;
}

/// Which checks gate assigning a volunteer to a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eligibility {
    RolesOnly,
    #[default]
    RolesAndActive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub description: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub display_volunteer_email: bool,
    #[serde(default)]
    pub display_volunteer_phone: bool,
    #[serde(default)]
    pub display_volunteer_notes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer: Option<Volunteer>,
}

impl Shift {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            roles: Vec::new(),
            display_volunteer_email: false,
            display_volunteer_phone: false,
            display_volunteer_notes: false,
            volunteer: None,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn check_eligible(
        &self,
        volunteer: &Volunteer,
        policy: Eligibility,
    ) -> Result<(), EligibilityError> {
        let missing: Vec<String> = self
            .roles
            .iter()
            .filter(|role| !volunteer.has_role(role))
            .map(|role| role.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(EligibilityError::MissingRoles {
                volunteer: volunteer.name.clone(),
                shift: self.description.clone(),
                missing,
            });
        }
        if policy == Eligibility::RolesAndActive && !volunteer.active {
            return Err(EligibilityError::Inactive {
                volunteer: volunteer.name.clone(),
            });
        }
        Ok(())
    }

    pub fn assign(
        &mut self,
        volunteer: Volunteer,
        policy: Eligibility,
    ) -> Result<(), EligibilityError> {
        self.check_eligible(&volunteer, policy)?;
        self.volunteer = Some(volunteer);
        Ok(())
    }

    pub fn unassign(&mut self) -> Option<Volunteer> {
        self.volunteer.take()
    }

    /// Copy of this shift as an open slot.
    pub fn cleared(&self) -> Self {
        Self {
            volunteer: None,
            ..self.clone()
        }
    }

    pub fn retain_roles(&mut self, canonical: &[Role]) -> bool {
        retain_known(&mut self.roles, canonical)
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl Record for Shift {
    const KIND: CollectionKind = CollectionKind::Shifts;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manager {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

impl Manager {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: String::new(),
        }
    }
}

impl fmt::Display for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Record for Manager {
    const KIND: CollectionKind = CollectionKind::Managers;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventProperty {
    pub name: String,
    #[serde(default)]
    pub default_value: String,
}

impl EventProperty {
    pub fn new(name: impl Into<String>, default_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_value: default_value.into(),
        }
    }
}

impl fmt::Display for EventProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Record for EventProperty {
    const KIND: CollectionKind = CollectionKind::EventProperties;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendType {
    #[default]
    To,
    Cc,
    Bcc,
}

/// A validated strftime pattern that is known to render a calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DatePattern(String);

impl DatePattern {
    pub fn parse(pattern: &str) -> Result<Self, DatePatternError> {
        if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
            return Err(DatePatternError::Malformed {
                pattern: pattern.to_string(),
            });
        }
        let mut probe = String::new();
        if write!(probe, "{}", NaiveDate::default().format(pattern)).is_err() {
            return Err(DatePatternError::NotADate {
                pattern: pattern.to_string(),
            });
        }
        Ok(Self(pattern.to_string()))
    }

    /// Like [`DatePattern::parse`], but an invalid pattern becomes the empty pattern.
    pub fn lenient(pattern: &str) -> Self {
        match Self::parse(pattern) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(%err, "falling back to empty date pattern");
                Self::default()
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn format(&self, date: NaiveDate) -> String {
        let pattern = if self.0.is_empty() {
            ISO_DATE_PATTERN
        } else {
            self.0.as_str()
        };
        let mut rendered = String::new();
        match write!(rendered, "{}", date.format(pattern)) {
            Ok(()) => rendered,
            Err(_) => date.format(ISO_DATE_PATTERN).to_string(),
        }
    }
}

impl From<String> for DatePattern {
    fn from(raw: String) -> Self {
        Self::lenient(&raw)
    }
}

impl From<DatePattern> for String {
    fn from(pattern: DatePattern) -> Self {
        pattern.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmailTemplate {
    #[serde(default)]
    pub send_type: SendType,
    #[serde(default)]
    pub pre_schedule_text: String,
    #[serde(default)]
    pub post_schedule_text: String,
    #[serde(default)]
    pub subject_line_template: String,
    #[serde(default)]
    pub date_format: DatePattern,
}

impl EmailTemplate {
    pub fn new(
        send_type: SendType,
        pre_schedule_text: impl Into<String>,
        post_schedule_text: impl Into<String>,
        subject_line_template: impl Into<String>,
        date_format: &str,
    ) -> Self {
        Self {
            send_type,
            pre_schedule_text: pre_schedule_text.into(),
            post_schedule_text: post_schedule_text.into(),
            subject_line_template: subject_line_template.into(),
            date_format: DatePattern::lenient(date_format),
        }
    }
}

impl Record for EmailTemplate {
    const KIND: CollectionKind = CollectionKind::EmailTemplate;
}

fn retain_known(roles: &mut Vec<Role>, canonical: &[Role]) -> bool {
    let before = roles.len();
    roles.retain(|role| canonical.contains(role));
    roles.len() != before
}
