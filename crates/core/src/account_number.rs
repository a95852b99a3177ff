//! Externally visible account numbers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Fixed-width, all-digit account number (e.g. `"004219873"`).
///
/// Uniqueness is a store concern; this type only guarantees the format.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountNumber(String);

impl AccountNumber {
    pub const WIDTH: usize = 9;

    /// Exclusive upper bound for the numeric value (`10^WIDTH`).
    pub const SPACE: u32 = 1_000_000_000;

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        if s.len() != Self::WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::invalid_account_number(format!(
                "expected {} digits, got {s:?}",
                Self::WIDTH
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Zero-padded rendering of a value in `0..SPACE`.
    pub fn from_value(value: u32) -> Result<Self, DomainError> {
        if value >= Self::SPACE {
            return Err(DomainError::invalid_account_number(format!(
                "{value} does not fit in {} digits",
                Self::WIDTH
            )));
        }
        Ok(Self(format!("{value:09}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountNumber> for String {
    fn from(value: AccountNumber) -> Self {
        value.0
    }
}
