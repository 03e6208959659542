use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{char_len, is_web_url, ServiceId, UserId};

pub const SERVICE_NAME_MIN: usize = 2;
pub const SERVICE_NAME_MAX: usize = 40;
pub const SERVICE_AVATAR_URL_MAX: usize = 256;

/// Names that would shadow top-level routes of the site.
pub const RESERVED_SERVICE_NAMES: [&str; 7] = [
    "actions", "api", "auth", "internal", "invoices", "metrics", "services",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceCreate {
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceValidationError {
    #[error("name must be between {SERVICE_NAME_MIN} and {SERVICE_NAME_MAX} characters")]
    NameLength,
    #[error("name may only contain lowercase letters, digits and dashes, and cannot start with a dash")]
    NameCharacters,
    #[error("name `{0}` is reserved")]
    ReservedName(String),
    #[error("avatar_url must be an http(s) URL of at most {SERVICE_AVATAR_URL_MAX} characters")]
    AvatarUrl,
}

impl ServiceCreate {
    pub fn validate(&self) -> Result<(), ServiceValidationError> {
        validate_service_name(&self.name)?;
        if let Some(url) = &self.avatar_url {
            if !is_web_url(url, SERVICE_AVATAR_URL_MAX) {
                return Err(ServiceValidationError::AvatarUrl);
            }
        }
        Ok(())
    }
}

/// Service names double as URL slugs (`/{name}/invoices/...`).
pub fn validate_service_name(name: &str) -> Result<(), ServiceValidationError> {
    if !(SERVICE_NAME_MIN..=SERVICE_NAME_MAX).contains(&char_len(name)) {
        return Err(ServiceValidationError::NameLength);
    }
    let slug_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !slug_chars || name.starts_with('-') {
        return Err(ServiceValidationError::NameCharacters);
    }
    if RESERVED_SERVICE_NAMES.contains(&name) {
        return Err(ServiceValidationError::ReservedName(name.to_owned()));
    }
    Ok(())
}

/// Resolves the `serviceNameOrId` path segment used across the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceRef {
    Id(ServiceId),
    Name(String),
}

impl ServiceRef {
    pub fn parse(value: &str) -> Self {
        match ServiceId::parse(value) {
            Ok(id) => ServiceRef::Id(id),
            Err(_) => ServiceRef::Name(value.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewService {
    pub id: ServiceId,
    pub user_id: UserId,
    pub name: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub user_id: UserId,
    pub name: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cache tag covering every service list owned by `user_id`.
pub fn user_services_tag(user_id: &UserId) -> String {
    format!("user-{user_id}-services")
}
