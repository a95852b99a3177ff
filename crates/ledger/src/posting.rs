//! Posting planners: pure decision logic for balance mutations.
//!
//! A planner takes the accounts as read under lock and returns everything the
//! engine must write in one atomic unit: the new balances and the transaction
//! records. Planners never mutate their inputs and never perform IO, so the
//! whole decision can be tested without a store.

use chrono::{DateTime, Utc};
use thiserror::Error;

use bankledger_core::{AccountId, Amount, Balance, PostingId};

use crate::account::Account;
use crate::transaction::{NewTransaction, TransactionKind, TransactionStatus};

/// Business-rule failure detected while planning (before any write).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostingError {
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Balance, requested: Amount },

    #[error("balance overflow on account {0}")]
    BalanceOverflow(AccountId),

    #[error("source and destination are the same account")]
    SameAccount,
}

/// New balance for one account, with the value it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub account_id: AccountId,
    pub previous: Balance,
    pub next: Balance,
}

/// Everything one atomic unit writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub posting_id: PostingId,
    pub updates: Vec<BalanceUpdate>,
    pub entries: Vec<NewTransaction>,
}

impl Posting {
    /// Net change in the sum of all balances touched by this posting.
    pub fn net_change(&self) -> i128 {
        self.updates
            .iter()
            .map(|u| u.next.minor_units() as i128 - u.previous.minor_units() as i128)
            .sum()
    }
}

fn single_entry(
    posting_id: PostingId,
    kind: TransactionKind,
    account_id: AccountId,
    amount: Amount,
    at: DateTime<Utc>,
) -> NewTransaction {
    NewTransaction {
        posting_id,
        kind,
        amount,
        account_id,
        from_account_id: None,
        to_account_id: None,
        status: TransactionStatus::Success,
        occurred_at: at,
    }
}

pub fn plan_deposit(
    account: &Account,
    amount: Amount,
    at: DateTime<Utc>,
) -> Result<Posting, PostingError> {
    let next = account
        .balance
        .checked_credit(amount)
        .ok_or(PostingError::BalanceOverflow(account.id))?;

    let posting_id = PostingId::new();
    Ok(Posting {
        posting_id,
        updates: vec![BalanceUpdate {
            account_id: account.id,
            previous: account.balance,
            next,
        }],
        entries: vec![single_entry(
            posting_id,
            TransactionKind::Deposit,
            account.id,
            amount,
            at,
        )],
    })
}

pub fn plan_withdrawal(
    account: &Account,
    amount: Amount,
    at: DateTime<Utc>,
) -> Result<Posting, PostingError> {
    let next = account
        .balance
        .checked_debit(amount)
        .ok_or(PostingError::InsufficientBalance {
            available: account.balance,
            requested: amount,
        })?;

    let posting_id = PostingId::new();
    Ok(Posting {
        posting_id,
        updates: vec![BalanceUpdate {
            account_id: account.id,
            previous: account.balance,
            next,
        }],
        entries: vec![single_entry(
            posting_id,
            TransactionKind::Withdrawal,
            account.id,
            amount,
            at,
        )],
    })
}

/// Plan a transfer: debit `source`, credit `destination`, one record per side.
///
/// Updates and entries are listed source first.
pub fn plan_transfer(
    source: &Account,
    destination: &Account,
    amount: Amount,
    at: DateTime<Utc>,
) -> Result<Posting, PostingError> {
    if source.id == destination.id {
        return Err(PostingError::SameAccount);
    }

    let source_next = source
        .balance
        .checked_debit(amount)
        .ok_or(PostingError::InsufficientBalance {
            available: source.balance,
            requested: amount,
        })?;
    let destination_next = destination
        .balance
        .checked_credit(amount)
        .ok_or(PostingError::BalanceOverflow(destination.id))?;

    let posting_id = PostingId::new();
    let leg = |account_id: AccountId| NewTransaction {
        posting_id,
        kind: TransactionKind::Transfer,
        amount,
        account_id,
        from_account_id: Some(source.id),
        to_account_id: Some(destination.id),
        status: TransactionStatus::Success,
        occurred_at: at,
    };

    Ok(Posting {
        posting_id,
        updates: vec![
            BalanceUpdate {
                account_id: source.id,
                previous: source.balance,
                next: source_next,
            },
            BalanceUpdate {
                account_id: destination.id,
                previous: destination.balance,
                next: destination_next,
            },
        ],
        entries: vec![leg(source.id), leg(destination.id)],
    })
}

/// Audit entry for an account opened with a positive balance.
pub fn opening_entry(account: &Account) -> Option<NewTransaction> {
    let amount = Amount::new(account.balance.minor_units()).ok()?;
    Some(single_entry(
        PostingId::new(),
        TransactionKind::Deposit,
        account.id,
        amount,
        account.created_at,
    ))
}
