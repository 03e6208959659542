use chrono::{DateTime, Utc};
use hex::encode as hex_encode;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use super::{char_len, ApiKeyId, ServiceId};

/// Prefix that makes leaked keys easy to recognize in logs and scanners.
pub const API_KEY_PREFIX: &str = "npk_";

const API_KEY_SECRET_BYTES: usize = 32;
const API_KEY_NAME_MIN: usize = 2;
const API_KEY_NAME_MAX: usize = 40;
const API_KEY_DESCRIPTION_MAX: usize = 512;

/// Plaintext API key. Only ever held in memory between generation and the
/// response that hands it to the merchant.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeySecret(String);

impl ApiKeySecret {
    /// Generates `npk_` followed by 64 hex characters of OS randomness.
    pub fn generate() -> Result<Self, getrandom::Error> {
        let mut bytes = [0u8; API_KEY_SECRET_BYTES];
        getrandom::fill(&mut bytes)?;
        Ok(Self(format!("{API_KEY_PREFIX}{}", hex_encode(bytes))))
    }

    pub fn from_bearer(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn hash(&self) -> ApiKeyHash {
        hash_api_key(&self.0)
    }
}

impl std::fmt::Debug for ApiKeySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKeySecret(..)")
    }
}

/// Hex SHA3-256 digest of an API key; the only form that is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiKeyHash(String);

impl ApiKeyHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Deterministically derives the SHA3-256 fingerprint stored for a key.
pub fn hash_api_key(secret: &str) -> ApiKeyHash {
    let mut hasher = Sha3_256::new();
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    ApiKeyHash(hex_encode(digest))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiKeyValidationError {
    #[error("name must be between {API_KEY_NAME_MIN} and {API_KEY_NAME_MAX} characters")]
    NameLength,
    #[error("description must be at most {API_KEY_DESCRIPTION_MAX} characters")]
    DescriptionTooLong,
}

impl ApiKeyCreate {
    pub fn validate(&self) -> Result<(), ApiKeyValidationError> {
        if !(API_KEY_NAME_MIN..=API_KEY_NAME_MAX).contains(&char_len(&self.name)) {
            return Err(ApiKeyValidationError::NameLength);
        }
        if let Some(description) = &self.description {
            if char_len(description) > API_KEY_DESCRIPTION_MAX {
                return Err(ApiKeyValidationError::DescriptionTooLong);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApiKey {
    pub id: ApiKeyId,
    pub service_id: ServiceId,
    pub name: String,
    pub description: String,
    pub key_hash: ApiKeyHash,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub id: ApiKeyId,
    pub service_id: ServiceId,
    pub name: String,
    pub description: String,
    pub key_hash: ApiKeyHash,
    pub created_at: DateTime<Utc>,
}
