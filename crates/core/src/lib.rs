//! `bankledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, money in minor units, and account numbers.

pub mod account_number;
pub mod error;
pub mod id;
pub mod money;

pub use account_number::AccountNumber;
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, PostingId, TransactionId, UserId};
pub use money::{Amount, Balance};
