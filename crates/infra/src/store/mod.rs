//! Account Store + Transaction Log boundary.
//!
//! Every balance mutation happens inside a [`UnitOfWork`] opened with
//! [`LedgerStore::begin`]. A unit is both an [`AccountStore`] and a
//! [`TransactionLog`], so an account write and the transaction record that
//! accompanies it can only ever be staged together and committed together.
//!
//! ## Locking
//!
//! `find_for_update` is the only way to obtain an account that may be saved.
//! It takes an exclusive per-account lock scoped to the unit, bounded by the
//! store's lock timeout (expiry surfaces as [`StoreError::Busy`]). Locks are
//! released when the unit commits, rolls back, or is dropped.
//!
//! Callers that lock more than one account must lock in ascending
//! `AccountId` order.
//!
//! ## Visibility
//!
//! Staged writes are invisible outside the unit until `commit()`, which
//! publishes all of them at once. Reads on the [`LedgerStore`] itself always
//! see committed state only.

use async_trait::async_trait;
use thiserror::Error;

use bankledger_core::{AccountId, AccountNumber, TransactionId, UserId};
use bankledger_ledger::{Account, AccountType, NewAccount, NewTransaction, TransactionRecord};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

/// Storage operation error.
///
/// These are storage outcomes (missing rows, uniqueness, lock contention,
/// backend faults); the engine decides what each means for the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("account number {0} already exists")]
    DuplicateAccountNumber(AccountNumber),

    #[error("owner already holds a {0} account")]
    AccountTypeExists(AccountType),

    /// Lock not acquired in time, deadlock victim, or serialization conflict.
    #[error("busy: {0}")]
    Busy(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Keyed account storage, scoped to one unit of work.
#[async_trait]
pub trait AccountStore: Send {
    /// Read an account without locking it (committed state, or this unit's
    /// staged version).
    async fn find(&mut self, number: &AccountNumber) -> Result<Account, StoreError>;

    /// Read an account and hold its exclusive lock until the unit ends.
    async fn find_for_update(&mut self, number: &AccountNumber) -> Result<Account, StoreError>;

    /// Stage a balance write. The account must be locked (or created) by this unit.
    async fn save(&mut self, account: &Account) -> Result<(), StoreError>;

    /// Create an account; the store assigns its `AccountId`.
    ///
    /// Fails with `DuplicateAccountNumber` or `AccountTypeExists` when the
    /// number, or the (owner, type) pair, is already taken.
    async fn create(&mut self, account: NewAccount) -> Result<Account, StoreError>;
}

/// Append-only transaction log, scoped to one unit of work.
#[async_trait]
pub trait TransactionLog: Send {
    async fn append(&mut self, entry: NewTransaction) -> Result<TransactionRecord, StoreError>;
}

/// One atomic unit: all staged account writes and appended records commit or
/// roll back together.
#[async_trait]
pub trait UnitOfWork: AccountStore + TransactionLog {
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Ledger storage backend: opens units and serves committed reads.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn find_account(&self, number: &AccountNumber) -> Result<Account, StoreError>;

    /// Accounts of `owner`, ordered by `AccountId`.
    async fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>, StoreError>;

    async fn transaction(&self, id: TransactionId) -> Result<TransactionRecord, StoreError>;

    /// Records against `account_id`, ordered by `TransactionId`.
    async fn transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Records against any account of `owner`, ordered by `TransactionId`.
    async fn transactions_for_owner(
        &self,
        owner: UserId,
    ) -> Result<Vec<TransactionRecord>, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for std::sync::Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        (**self).begin().await
    }

    async fn find_account(&self, number: &AccountNumber) -> Result<Account, StoreError> {
        (**self).find_account(number).await
    }

    async fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>, StoreError> {
        (**self).accounts_for_owner(owner).await
    }

    async fn transaction(&self, id: TransactionId) -> Result<TransactionRecord, StoreError> {
        (**self).transaction(id).await
    }

    async fn transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        (**self).transactions_for_account(account_id).await
    }

    async fn transactions_for_owner(
        &self,
        owner: UserId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        (**self).transactions_for_owner(owner).await
    }
}
