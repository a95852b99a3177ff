//! Ledger engine: the only code path that mutates balances.
//!
//! ## Mutation Flow
//!
//! ```text
//! request
//!   ↓
//! 1. Validate input (amount, account number text)
//!   ↓
//! 2. Open a unit of work, lock the account(s) for update
//!   ↓
//! 3. Check ownership / existence, plan the posting (pure, no writes)
//!   ↓
//! 4. Save new balances + append transaction records
//!   ↓
//! 5. Commit (or roll back on any failure in 2-4)
//!   ↓
//! 6. Emit notifications (best-effort, outside the unit)
//! ```
//!
//! ## Locking
//!
//! Deposit and withdraw lock one account. Transfer locks two, always in
//! ascending `AccountId` order whatever the argument order, so A→B and B→A
//! running together cannot deadlock. A lock that cannot be acquired within
//! the store's timeout surfaces as [`LedgerError::Busy`].
//!
//! ## Failure Order
//!
//! Transfer preconditions are evaluated in a fixed order and the first
//! failure wins: amount, source ownership, destination existence, distinct
//! accounts, sufficient balance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use bankledger_core::{AccountNumber, Amount, Balance, TransactionId, UserId};
use bankledger_ledger::{
    Account, AccountType, LedgerNotification, NewAccount, Posting, TransactionRecord,
    opening_entry, plan_deposit, plan_transfer, plan_withdrawal,
};

use crate::account_numbers::{AccountNumberGenerator, RandomAccountNumbers};
use crate::config::DEFAULT_ACCOUNT_NUMBER_ATTEMPTS;
use crate::contacts::{ContactDirectory, InMemoryContactDirectory};
use crate::notifier::Notifier;
use crate::store::{LedgerStore, StoreError, UnitOfWork};

mod error;

pub use error::LedgerError;

/// Outcome of a committed deposit, withdrawal or transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReceipt {
    /// New balance of the account the caller acted on (the source, for transfers).
    pub balance: Balance,
    /// Records written by the unit, in append order.
    pub transactions: Vec<TransactionRecord>,
}

/// Balance-mutation and transaction-recording engine.
///
/// Generic over the storage backend and the notification sink; both are
/// injected, nothing is global.
pub struct LedgerEngine<S, N> {
    store: S,
    notifier: N,
    numbers: Arc<dyn AccountNumberGenerator>,
    contacts: Arc<dyn ContactDirectory>,
    account_number_attempts: u32,
}

impl<S, N> LedgerEngine<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            numbers: Arc::new(RandomAccountNumbers),
            contacts: Arc::new(InMemoryContactDirectory::new()),
            account_number_attempts: DEFAULT_ACCOUNT_NUMBER_ATTEMPTS,
        }
    }

    pub fn with_account_numbers(mut self, numbers: Arc<dyn AccountNumberGenerator>) -> Self {
        self.numbers = numbers;
        self
    }

    pub fn with_contacts(mut self, contacts: Arc<dyn ContactDirectory>) -> Self {
        self.contacts = contacts;
        self
    }

    pub fn with_account_number_attempts(mut self, attempts: u32) -> Self {
        self.account_number_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, N> LedgerEngine<S, N>
where
    S: LedgerStore,
    N: Notifier,
{
    /// Credit `amount` to the account. Returns the new balance.
    #[instrument(skip(self), err)]
    pub async fn deposit(
        &self,
        account_no: &str,
        amount: i64,
    ) -> Result<MutationReceipt, LedgerError> {
        let amount = positive_amount(amount)?;
        let number = AccountNumber::parse(account_no).map_err(|_| LedgerError::AccountNotFound)?;
        let at = Utc::now();

        let mut unit = self.store.begin().await?;
        let outcome = async {
            let account = unit.find_for_update(&number).await?;
            let posting = plan_deposit(&account, amount, at)?;
            let written = write_posting(unit.as_mut(), &[account], &posting, at).await?;
            Ok::<_, LedgerError>(written)
        }
        .await;
        let (updated, records) = finish(unit, outcome).await?;

        let account = single(updated)?;
        info!(
            account_no = %account.number,
            amount = amount.minor_units(),
            balance = account.balance.minor_units(),
            "deposit committed"
        );
        self.emit(LedgerNotification::deposit(
            account.owner,
            account.number.clone(),
            amount,
            at,
        ));

        Ok(MutationReceipt {
            balance: account.balance,
            transactions: records,
        })
    }

    /// Debit `amount` from an account owned by `caller`. Returns the new balance.
    ///
    /// A missing account and someone else's account both fail with
    /// [`LedgerError::AccessDenied`].
    #[instrument(skip(self), err)]
    pub async fn withdraw(
        &self,
        account_no: &str,
        caller: UserId,
        amount: i64,
    ) -> Result<MutationReceipt, LedgerError> {
        let amount = positive_amount(amount)?;
        let number = AccountNumber::parse(account_no).map_err(|_| LedgerError::AccessDenied)?;
        let at = Utc::now();

        let mut unit = self.store.begin().await?;
        let outcome = async {
            let account = unit
                .find_for_update(&number)
                .await
                .map_err(|e| denied_if_missing(e.into()))?;
            if !account.is_owned_by(caller) {
                return Err(LedgerError::AccessDenied);
            }
            let posting = plan_withdrawal(&account, amount, at)?;
            write_posting(unit.as_mut(), &[account], &posting, at).await
        }
        .await;
        let (updated, records) = finish(unit, outcome).await?;

        let account = single(updated)?;
        info!(
            account_no = %account.number,
            amount = amount.minor_units(),
            balance = account.balance.minor_units(),
            "withdrawal committed"
        );
        self.emit(LedgerNotification::withdraw(
            account.owner,
            account.number.clone(),
            amount,
            at,
        ));

        Ok(MutationReceipt {
            balance: account.balance,
            transactions: records,
        })
    }

    /// Move `amount` from `from_no` (owned by `caller`) to `to_no`.
    ///
    /// Both balances and both transfer records commit together or not at all.
    /// Returns the source's new balance.
    #[instrument(skip(self), err)]
    pub async fn transfer(
        &self,
        from_no: &str,
        to_no: &str,
        caller: UserId,
        amount: i64,
    ) -> Result<MutationReceipt, LedgerError> {
        // 1) Validate input
        let amount = positive_amount(amount)?;
        let from = AccountNumber::parse(from_no).map_err(|_| LedgerError::AccessDenied)?;
        let at = Utc::now();

        let mut unit = self.store.begin().await?;
        let outcome = async {
            // 2) Resolve both sides (unlocked) in precondition order
            let source = unit
                .find(&from)
                .await
                .map_err(|e| denied_if_missing(e.into()))?;
            if !source.is_owned_by(caller) {
                return Err(LedgerError::AccessDenied);
            }
            let to = AccountNumber::parse(to_no).map_err(|_| LedgerError::AccountNotFound)?;
            let destination = unit.find(&to).await?;
            if source.id == destination.id {
                return Err(LedgerError::SameAccount);
            }

            // 3) Lock in ascending AccountId order, then use the locked reads
            let (source, destination) = if source.id < destination.id {
                let s = unit.find_for_update(&from).await?;
                let d = unit.find_for_update(&to).await?;
                (s, d)
            } else {
                let d = unit.find_for_update(&to).await?;
                let s = unit.find_for_update(&from).await?;
                (s, d)
            };

            // 4) Plan + write
            let posting = plan_transfer(&source, &destination, amount, at)?;
            write_posting(unit.as_mut(), &[source, destination], &posting, at).await
        }
        .await;

        // 5) Commit or roll back
        let (updated, records) = finish(unit, outcome).await?;

        let [source, destination] = <[Account; 2]>::try_from(updated).map_err(|_| {
            LedgerError::StorageFailure("transfer did not update exactly two accounts".into())
        })?;
        info!(
            from = %source.number,
            to = %destination.number,
            amount = amount.minor_units(),
            source_balance = source.balance.minor_units(),
            "transfer committed"
        );

        // 6) Notify both owners
        for notification in LedgerNotification::transfer_pair(
            source.owner,
            destination.owner,
            source.number.clone(),
            destination.number.clone(),
            amount,
            at,
        ) {
            self.emit(notification);
        }

        Ok(MutationReceipt {
            balance: source.balance,
            transactions: records,
        })
    }

    /// Open an account of `account_type` for `owner` with a generated number.
    ///
    /// A positive opening balance is recorded as a deposit in the same unit.
    /// Number collisions are retried with a fresh candidate.
    #[instrument(skip(self), err)]
    pub async fn open_account(
        &self,
        owner: UserId,
        account_type: AccountType,
        initial_balance: i64,
    ) -> Result<Account, LedgerError> {
        let balance =
            Balance::new(initial_balance).map_err(|e| LedgerError::InvalidAmount(e.to_string()))?;

        let existing = self.store.accounts_for_owner(owner).await?;
        if existing.iter().any(|a| a.account_type == account_type) {
            return Err(LedgerError::AccountTypeExists(account_type));
        }

        for attempt in 1..=self.account_number_attempts {
            let new_account = NewAccount {
                number: self.numbers.next_candidate(),
                owner,
                account_type,
                balance,
                created_at: Utc::now(),
            };

            let mut unit = self.store.begin().await?;
            let outcome = async {
                let account = unit.create(new_account).await?;
                if let Some(entry) = opening_entry(&account) {
                    unit.append(entry).await?;
                }
                Ok::<_, LedgerError>(account)
            }
            .await;

            match finish(unit, outcome).await {
                Ok(account) => {
                    info!(
                        account_no = %account.number,
                        account_type = %account.account_type,
                        balance = account.balance.minor_units(),
                        "account opened"
                    );
                    self.emit(LedgerNotification::account_opened(
                        owner,
                        account.number.clone(),
                        account.balance,
                        account.created_at,
                    ));
                    return Ok(account);
                }
                Err(LedgerError::DuplicateAccountNumber(number)) => {
                    debug!(attempt, %number, "account number taken, drawing another");
                }
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::StorageFailure(format!(
            "no free account number after {} attempts",
            self.account_number_attempts
        )))
    }

    pub async fn account(&self, account_no: &str) -> Result<Account, LedgerError> {
        let number = AccountNumber::parse(account_no).map_err(|_| LedgerError::AccountNotFound)?;
        Ok(self.store.find_account(&number).await?)
    }

    /// The account, if it exists and belongs to `caller`.
    pub async fn owned_account(
        &self,
        account_no: &str,
        caller: UserId,
    ) -> Result<Account, LedgerError> {
        let account = self.account(account_no).await?;
        if !account.is_owned_by(caller) {
            return Err(LedgerError::AccessDenied);
        }
        Ok(account)
    }

    /// Committed balance (never reflects half of an in-flight transfer).
    pub async fn balance(&self, account_no: &str) -> Result<Balance, LedgerError> {
        Ok(self.account(account_no).await?.balance)
    }

    pub async fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>, LedgerError> {
        Ok(self.store.accounts_for_owner(owner).await?)
    }

    /// Records against one account, oldest first.
    pub async fn transactions_for(
        &self,
        account_no: &str,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let account = self.account(account_no).await?;
        Ok(self.store.transactions_for_account(account.id).await?)
    }

    pub async fn transaction(&self, id: TransactionId) -> Result<TransactionRecord, LedgerError> {
        self.store.transaction(id).await.map_err(|e| match e {
            StoreError::NotFound => LedgerError::TransactionNotFound,
            other => other.into(),
        })
    }

    /// A record, if it is recorded against one of `caller`'s accounts.
    pub async fn owned_transaction(
        &self,
        id: TransactionId,
        caller: UserId,
    ) -> Result<TransactionRecord, LedgerError> {
        let record = self.transaction(id).await?;
        let owned = self.store.accounts_for_owner(caller).await?;
        if !owned.iter().any(|a| a.id == record.account_id) {
            return Err(LedgerError::AccessDenied);
        }
        Ok(record)
    }

    pub async fn transactions_for_owner(
        &self,
        owner: UserId,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        Ok(self.store.transactions_for_owner(owner).await?)
    }

    fn emit(&self, notification: LedgerNotification) {
        let to_email = self.contacts.email_for(notification.user_id);
        self.notifier.notify(notification.with_contact(to_email));
    }
}

fn positive_amount(amount: i64) -> Result<Amount, LedgerError> {
    Amount::new(amount).map_err(|e| LedgerError::InvalidAmount(e.to_string()))
}

fn denied_if_missing(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::AccountNotFound => LedgerError::AccessDenied,
        other => other,
    }
}

fn single(mut updated: Vec<Account>) -> Result<Account, LedgerError> {
    match (updated.pop(), updated.is_empty()) {
        (Some(account), true) => Ok(account),
        _ => Err(LedgerError::StorageFailure(
            "posting did not update exactly one account".into(),
        )),
    }
}

/// Stage every balance update and record of `posting` in `unit`.
///
/// `locked` must hold each account the posting touches, as read under lock.
/// Returns the saved accounts in posting order and the appended records.
async fn write_posting(
    unit: &mut dyn UnitOfWork,
    locked: &[Account],
    posting: &Posting,
    at: DateTime<Utc>,
) -> Result<(Vec<Account>, Vec<TransactionRecord>), LedgerError> {
    let mut updated = Vec::with_capacity(posting.updates.len());
    for update in &posting.updates {
        let account = locked
            .iter()
            .find(|a| a.id == update.account_id)
            .ok_or_else(|| {
                LedgerError::StorageFailure(format!(
                    "posting touches account {} which is not locked",
                    update.account_id
                ))
            })?;
        let next = account.with_balance(update.next, at);
        unit.save(&next).await?;
        updated.push(next);
    }

    let mut records = Vec::with_capacity(posting.entries.len());
    for entry in &posting.entries {
        records.push(unit.append(entry.clone()).await?);
    }

    Ok((updated, records))
}

/// Commit on success, roll back on failure.
///
/// A rollback error is logged; the original failure is what the caller sees.
async fn finish<T>(
    unit: Box<dyn UnitOfWork>,
    outcome: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match outcome {
        Ok(value) => {
            unit.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = unit.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}
