//! Money in integer minor units (e.g. cents).
//!
//! Balances and amounts are never binary floating point. Arithmetic is checked:
//! overflow and going below zero are reported instead of wrapping.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A strictly positive quantity of money, in minor units.
///
/// Every deposit, withdrawal, and transfer moves an `Amount`; a zero or
/// negative amount cannot be constructed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub fn new(minor_units: i64) -> DomainResult<Self> {
        if minor_units <= 0 {
            return Err(DomainError::invalid_amount(format!(
                "amount must be positive (got {minor_units})"
            )));
        }
        Ok(Self(minor_units))
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Amount {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A non-negative account balance, in minor units.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Balance(i64);

impl Balance {
    pub const ZERO: Balance = Balance(0);

    pub fn new(minor_units: i64) -> DomainResult<Self> {
        if minor_units < 0 {
            return Err(DomainError::invalid_amount(format!(
                "balance cannot be negative (got {minor_units})"
            )));
        }
        Ok(Self(minor_units))
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.0
    }

    /// Balance after crediting `amount`, or `None` on overflow.
    pub fn checked_credit(self, amount: Amount) -> Option<Balance> {
        self.0.checked_add(amount.0).map(Balance)
    }

    /// Balance after debiting `amount`, or `None` if it would go negative.
    pub fn checked_debit(self, amount: Amount) -> Option<Balance> {
        if !self.covers(amount) {
            return None;
        }
        Some(Balance(self.0 - amount.0))
    }
}

impl TryFrom<i64> for Balance {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Balance> for i64 {
    fn from(value: Balance) -> Self {
        value.0
    }
}

impl core::fmt::Display for Balance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn amount_rejects_zero_and_negative() {
        assert!(matches!(Amount::new(0), Err(DomainError::InvalidAmount(_))));
        assert!(matches!(Amount::new(-1), Err(DomainError::InvalidAmount(_))));
        assert_eq!(Amount::new(1).unwrap().minor_units(), 1);
    }

    #[test]
    fn debit_beyond_balance_is_refused() {
        let balance = Balance::new(100).unwrap();
        assert_eq!(balance.checked_debit(Amount::new(150).unwrap()), None);
        assert_eq!(
            balance.checked_debit(Amount::new(100).unwrap()),
            Some(Balance::ZERO)
        );
    }

    #[test]
    fn credit_overflow_is_refused() {
        let balance = Balance::new(i64::MAX).unwrap();
        assert_eq!(balance.checked_credit(Amount::new(1).unwrap()), None);
    }

    #[test]
    fn amount_deserialization_validates() {
        assert!(serde_json::from_str::<Amount>("0").is_err());
        assert_eq!(serde_json::from_str::<Amount>("25").unwrap().minor_units(), 25);
    }

    proptest! {
        /// Crediting then debiting the same amount restores the balance.
        #[test]
        fn credit_then_debit_is_identity(start in 0i64..1_000_000_000, amt in 1i64..1_000_000_000) {
            let balance = Balance::new(start).unwrap();
            let amount = Amount::new(amt).unwrap();
            let after = balance.checked_credit(amount).unwrap().checked_debit(amount).unwrap();
            prop_assert_eq!(after, balance);
        }

        /// A successful debit never produces a negative balance.
        #[test]
        fn debit_never_goes_negative(start in 0i64..1_000_000, amt in 1i64..2_000_000) {
            let balance = Balance::new(start).unwrap();
            if let Some(after) = balance.checked_debit(Amount::new(amt).unwrap()) {
                prop_assert!(after.minor_units() >= 0);
            } else {
                prop_assert!(amt > start);
            }
        }
    }
}
