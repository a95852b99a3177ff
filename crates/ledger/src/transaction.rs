use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bankledger_core::{AccountId, Amount, PostingId, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(TransactionKind::Deposit),
            "withdrawal" => Some(TransactionKind::Withdrawal),
            "transfer" => Some(TransactionKind::Transfer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(TransactionStatus::Success),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

/// Effect of a record on the account it is recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Credit,
    Debit,
}

/// A record ready to be appended (the log assigns `id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub posting_id: PostingId,
    pub kind: TransactionKind,
    pub amount: Amount,
    /// Account this record is recorded against.
    pub account_id: AccountId,
    pub from_account_id: Option<AccountId>,
    pub to_account_id: Option<AccountId>,
    pub status: TransactionStatus,
    pub occurred_at: DateTime<Utc>,
}

impl NewTransaction {
    pub fn into_record(self, id: TransactionId) -> TransactionRecord {
        TransactionRecord {
            id,
            posting_id: self.posting_id,
            kind: self.kind,
            amount: self.amount,
            account_id: self.account_id,
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            status: self.status,
            occurred_at: self.occurred_at,
        }
    }
}

/// Immutable audit entry for one account.
///
/// A transfer is recorded twice (once per account), both records sharing
/// `posting_id`, `amount`, and the `from`/`to` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub posting_id: PostingId,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub account_id: AccountId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_account_id: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_account_id: Option<AccountId>,
    pub status: TransactionStatus,
    pub occurred_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn direction(&self) -> EntryDirection {
        match self.kind {
            TransactionKind::Deposit => EntryDirection::Credit,
            TransactionKind::Withdrawal => EntryDirection::Debit,
            TransactionKind::Transfer => {
                if self.from_account_id == Some(self.account_id) {
                    EntryDirection::Debit
                } else {
                    EntryDirection::Credit
                }
            }
        }
    }

    /// Signed effect on the recorded-against account's balance.
    pub fn signed_amount(&self) -> i64 {
        match self.direction() {
            EntryDirection::Credit => self.amount.minor_units(),
            EntryDirection::Debit => -self.amount.minor_units(),
        }
    }

    /// True when `other` is the opposite leg of the same transfer.
    pub fn is_counterpart_of(&self, other: &TransactionRecord) -> bool {
        self.kind == TransactionKind::Transfer
            && other.kind == TransactionKind::Transfer
            && self.id != other.id
            && self.posting_id == other.posting_id
            && self.amount == other.amount
            && self.from_account_id == other.from_account_id
            && self.to_account_id == other.to_account_id
            && self.account_id != other.account_id
    }
}
