use std::fmt;

use thiserror::Error;

/// Number of raw units in one XNO.
pub const RAW_PER_XNO: u128 = 10u128.pow(30);

const XNO_DECIMALS: usize = 30;

/// Amount of Nano expressed in raw, the indivisible unit of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Raw(u128);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount must be a finite, non-negative number")]
    NotFinite,
    #[error("amount `{0}` is not a valid decimal number")]
    Malformed(String),
    #[error("amount has more than {XNO_DECIMALS} fractional digits")]
    TooPrecise,
    #[error("amount overflows the raw range")]
    Overflow,
}

impl Raw {
    pub const ZERO: Raw = Raw(0);

    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Raw) -> Option<Raw> {
        self.0.checked_add(other.0).map(Raw)
    }

    pub fn checked_sub(self, other: Raw) -> Option<Raw> {
        self.0.checked_sub(other.0).map(Raw)
    }

    pub fn saturating_sub(self, other: Raw) -> Raw {
        Raw(self.0.saturating_sub(other.0))
    }

    /// Parses an integer raw string as returned by node RPC and stored in
    /// the database.
    pub fn parse_raw(value: &str) -> Result<Self, AmountError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::Malformed(value.to_owned()));
        }
        trimmed
            .parse::<u128>()
            .map(Raw)
            .map_err(|_| AmountError::Overflow)
    }

    /// Converts a JSON number of XNO into raw. The float is rendered with
    /// its shortest round-trip representation first, so `0.1` becomes
    /// exactly `10^29` raw instead of the binary approximation.
    pub fn from_xno(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() || value < 0.0 {
            return Err(AmountError::NotFinite);
        }
        Self::from_xno_str(&value.to_string())
    }

    /// Parses a plain decimal XNO string such as `"12.5"`.
    pub fn from_xno_str(value: &str) -> Result<Self, AmountError> {
        let trimmed = value.trim();
        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction)
        {
            return Err(AmountError::Malformed(value.to_owned()));
        }
        if fraction.len() > XNO_DECIMALS {
            return Err(AmountError::TooPrecise);
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountError::Overflow)?
        };
        let fraction: u128 = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{fraction:0<width$}", width = XNO_DECIMALS);
            padded.parse().map_err(|_| AmountError::Overflow)?
        };

        whole
            .checked_mul(RAW_PER_XNO)
            .and_then(|raw| raw.checked_add(fraction))
            .map(Raw)
            .ok_or(AmountError::Overflow)
    }

    /// Lossy conversion for JSON surfaces that expose XNO as numbers.
    pub fn to_xno(self) -> f64 {
        let whole = (self.0 / RAW_PER_XNO) as f64;
        let fraction = (self.0 % RAW_PER_XNO) as f64 / RAW_PER_XNO as f64;
        whole + fraction
    }
}

/// Renders the raw integer, which is also the persisted representation.
impl fmt::Display for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
