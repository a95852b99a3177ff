//! Ledger domain (accounts, transaction records, postings).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. The
//! engine in the infra crate loads accounts under lock, asks this crate to plan
//! a posting, and persists exactly what the plan says.

pub mod account;
pub mod notification;
pub mod posting;
pub mod transaction;

pub use account::{Account, AccountType, NewAccount};
pub use notification::{LedgerNotification, NotificationKind};
pub use posting::{
    BalanceUpdate, Posting, PostingError, opening_entry, plan_deposit, plan_transfer,
    plan_withdrawal,
};
pub use transaction::{
    EntryDirection, NewTransaction, TransactionKind, TransactionRecord, TransactionStatus,
};
