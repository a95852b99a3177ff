use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bankledger_core::{AccountId, AccountNumber, Balance, DomainError, UserId};

/// Closed set of account products. An owner holds at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Savings,
    Checking,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "savings",
            AccountType::Checking => "checking",
        }
    }
}

impl core::fmt::Display for AccountType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AccountType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "savings" => Ok(AccountType::Savings),
            "checking" => Ok(AccountType::Checking),
            other => Err(DomainError::validation(format!(
                "account type must be one of: savings, checking (got {other:?})"
            ))),
        }
    }
}

/// A bank account as stored.
///
/// `balance` is only ever changed by the ledger engine inside an atomic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub number: AccountNumber,
    pub owner: UserId,
    pub account_type: AccountType,
    pub balance: Balance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }

    /// Copy of this account carrying `balance`, stamped at `at`.
    pub fn with_balance(&self, balance: Balance, at: DateTime<Utc>) -> Account {
        Account {
            balance,
            updated_at: at,
            ..self.clone()
        }
    }
}

/// Account data handed to the store for creation (the store assigns `id`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub number: AccountNumber,
    pub owner: UserId,
    pub account_type: AccountType,
    pub balance: Balance,
    pub created_at: DateTime<Utc>,
}

impl NewAccount {
    pub fn into_account(self, id: AccountId) -> Account {
        Account {
            id,
            number: self.number,
            owner: self.owner,
            account_type: self.account_type,
            balance: self.balance,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}
