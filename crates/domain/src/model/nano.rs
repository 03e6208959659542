use std::fmt;

use thiserror::Error;

/// Prefix of every Nano account address.
pub const NANO_ADDRESS_PREFIX: &str = "nano_";

/// Number of base32 characters that follow the prefix (52 public key + 8
/// checksum).
pub const NANO_ADDRESS_BODY_LENGTH: usize = 60;

const NANO_ALPHABET: &str = "13456789abcdefghijkmnopqrstuwxyz";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NanoAddressError {
    #[error("address must start with `{NANO_ADDRESS_PREFIX}`")]
    MissingPrefix,
    #[error("address must have exactly {NANO_ADDRESS_BODY_LENGTH} characters after the prefix")]
    WrongLength,
    #[error("address contains characters outside the nano base32 alphabet")]
    InvalidCharacter,
}

/// Validated Nano account address (`nano_` followed by 60 base32 chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NanoAddress(String);

impl NanoAddress {
    pub fn parse(value: &str) -> Result<Self, NanoAddressError> {
        validate_nano_address(value)?;
        Ok(Self(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NanoAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validates the `^nano_[13456789abcdefghijkmnopqrstuwxyz]{60}$` contract.
pub fn validate_nano_address(value: &str) -> Result<(), NanoAddressError> {
    let Some(body) = value.strip_prefix(NANO_ADDRESS_PREFIX) else {
        return Err(NanoAddressError::MissingPrefix);
    };

    if body.len() != NANO_ADDRESS_BODY_LENGTH {
        return Err(NanoAddressError::WrongLength);
    }

    if !body.chars().all(|c| NANO_ALPHABET.contains(c)) {
        return Err(NanoAddressError::InvalidCharacter);
    }

    Ok(())
}
