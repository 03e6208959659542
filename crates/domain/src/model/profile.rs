use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{char_len, is_web_url, UserId};

const PROFILE_EMAIL_MAX: usize = 128;
const PROFILE_NAME_MIN: usize = 2;
const PROFILE_NAME_MAX: usize = 40;
const PROFILE_AVATAR_URL_MAX: usize = 256;

/// Registration payload; every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCreate {
    pub email: String,
    pub name: String,
    pub avatar_url: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileValidationError {
    #[error("email must be a valid address of at most {PROFILE_EMAIL_MAX} characters")]
    Email,
    #[error("name must be between {PROFILE_NAME_MIN} and {PROFILE_NAME_MAX} characters")]
    NameLength,
    #[error("avatar_url must be a URL of at most {PROFILE_AVATAR_URL_MAX} characters")]
    AvatarUrl,
}

impl ProfileCreate {
    pub fn validate(&self) -> Result<(), ProfileValidationError> {
        if char_len(&self.email) > PROFILE_EMAIL_MAX || !looks_like_email(&self.email) {
            return Err(ProfileValidationError::Email);
        }
        if !(PROFILE_NAME_MIN..=PROFILE_NAME_MAX).contains(&char_len(&self.name)) {
            return Err(ProfileValidationError::NameLength);
        }
        if !is_web_url(&self.avatar_url, PROFILE_AVATAR_URL_MAX) {
            return Err(ProfileValidationError::AvatarUrl);
        }
        Ok(())
    }
}

/// `local@domain.tld` with no whitespace; deliverability is the identity
/// provider's concern.
pub fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
}
