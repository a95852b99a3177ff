use thiserror::Error;

use bankledger_core::{AccountNumber, Amount, Balance};
use bankledger_ledger::{AccountType, PostingError};

use crate::store::StoreError;

/// Failure of a ledger engine operation.
///
/// Every variant has a stable [`code`](LedgerError::code). Validation and
/// business-rule variants are always detected before anything is written;
/// `Busy` and `StorageFailure` mean the unit was rolled back and stored state
/// is unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("account not found")]
    AccountNotFound,

    /// Not found and not owned are deliberately indistinguishable.
    #[error("account not found or access denied")]
    AccessDenied,

    #[error("source and destination are the same account")]
    SameAccount,

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Balance, requested: Amount },

    #[error("owner already holds a {0} account")]
    AccountTypeExists(AccountType),

    /// Only surfaces if account number retries are exhausted mid-flight.
    #[error("account number {0} already exists")]
    DuplicateAccountNumber(AccountNumber),

    #[error("transaction not found")]
    TransactionNotFound,

    #[error("ledger busy, retry: {0}")]
    Busy(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::AccountNotFound => "account_not_found",
            LedgerError::AccessDenied => "access_denied",
            LedgerError::SameAccount => "same_account",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::AccountTypeExists(_) => "account_type_exists",
            LedgerError::DuplicateAccountNumber(_) => "duplicate_account_number",
            LedgerError::TransactionNotFound => "transaction_not_found",
            LedgerError::Busy(_) => "busy",
            LedgerError::StorageFailure(_) => "storage_failure",
        }
    }

    /// True when the same request may succeed if simply retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Busy(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => LedgerError::AccountNotFound,
            StoreError::DuplicateAccountNumber(n) => LedgerError::DuplicateAccountNumber(n),
            StoreError::AccountTypeExists(t) => LedgerError::AccountTypeExists(t),
            StoreError::Busy(msg) => LedgerError::Busy(msg),
            StoreError::Backend(msg) => LedgerError::StorageFailure(msg),
        }
    }
}

impl From<PostingError> for LedgerError {
    fn from(value: PostingError) -> Self {
        match value {
            PostingError::InsufficientBalance {
                available,
                requested,
            } => LedgerError::InsufficientBalance {
                available,
                requested,
            },
            PostingError::BalanceOverflow(id) => LedgerError::InvalidAmount(format!(
                "amount would overflow the balance of account {id}"
            )),
            PostingError::SameAccount => LedgerError::SameAccount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_busy_is_retryable() {
        assert!(LedgerError::Busy("lock timeout".into()).is_retryable());
        assert!(!LedgerError::StorageFailure("disk".into()).is_retryable());
        assert!(!LedgerError::AccessDenied.is_retryable());
    }

    #[test]
    fn store_errors_map_to_engine_errors() {
        assert_eq!(
            LedgerError::from(StoreError::Busy("55P03".into())).code(),
            "busy"
        );
        assert_eq!(
            LedgerError::from(StoreError::backend("connection reset")).code(),
            "storage_failure"
        );
        assert_eq!(
            LedgerError::from(StoreError::AccountTypeExists(AccountType::Savings)),
            LedgerError::AccountTypeExists(AccountType::Savings)
        );
    }

    #[test]
    fn access_denied_message_does_not_reveal_existence() {
        assert_eq!(
            LedgerError::AccessDenied.to_string(),
            "account not found or access denied"
        );
    }
}
