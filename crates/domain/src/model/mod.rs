//! Data structures and helpers shared across the API and watcher binaries.

mod amount;
mod api_key;
mod invoice;
mod nano;
mod profile;
mod service;
mod view;
mod webhook;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

pub use amount::*;
pub use api_key::*;
pub use invoice::*;
pub use nano::*;
pub use profile::*;
pub use service::*;
pub use view::*;
pub use webhook::*;

/// Malformed identifier supplied by a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid identifier `{0}`")]
pub struct IdFormatError(pub String);

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            pub fn parse(value: &str) -> Result<Self, IdFormatError> {
                Uuid::parse_str(value.trim())
                    .map(Self)
                    .map_err(|_| IdFormatError(value.to_owned()))
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = IdFormatError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

uuid_id!(
    /// Merchant namespace identifier.
    ServiceId
);
uuid_id!(InvoiceId);
uuid_id!(PaymentId);
uuid_id!(ApiKeyId);
uuid_id!(WebhookId);
uuid_id!(
    /// Identifier issued by the identity provider for an authenticated user.
    UserId
);

/// Currency code every invoice is priced in.
pub const CURRENCY: &str = "XNO";

/// Counts characters rather than bytes so multi-byte titles validate the
/// same way a browser form would.
pub(crate) fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Accepts absolute `http`/`https` URLs up to `max_len` characters.
pub(crate) fn is_web_url(value: &str, max_len: usize) -> bool {
    if char_len(value) > max_len {
        return false;
    }
    match url::Url::parse(value) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some(),
        Err(_) => false,
    }
}
