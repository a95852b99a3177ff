//! Notification emitted after a committed mutation.
//!
//! The JSON shape is what downstream mailers consume:
//!
//! ```json
//! {"type":"transfer_sent","status":"success","user_id":"…","amount":5000,
//!  "from":"000000001","to":"000000002","timestamp":"…","to_email":"a@b.c"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bankledger_core::{AccountNumber, Amount, Balance, UserId};
use bankledger_events::Event;

use crate::transaction::TransactionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Deposit,
    Withdraw,
    TransferSent,
    TransferReceived,
    AccountOpened,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Deposit => "deposit",
            NotificationKind::Withdraw => "withdraw",
            NotificationKind::TransferSent => "transfer_sent",
            NotificationKind::TransferReceived => "transfer_received",
            NotificationKind::AccountOpened => "account_opened",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub status: TransactionStatus,
    /// User the notification is addressed to.
    pub user_id: UserId,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_no: Option<AccountNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<AccountNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<AccountNumber>,
    pub timestamp: DateTime<Utc>,
    pub to_email: Option<String>,
}

impl LedgerNotification {
    fn base(kind: NotificationKind, user_id: UserId, amount: i64, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            status: TransactionStatus::Success,
            user_id,
            amount,
            account_no: None,
            from: None,
            to: None,
            timestamp: at,
            to_email: None,
        }
    }

    pub fn deposit(user_id: UserId, account_no: AccountNumber, amount: Amount, at: DateTime<Utc>) -> Self {
        Self {
            account_no: Some(account_no),
            ..Self::base(NotificationKind::Deposit, user_id, amount.minor_units(), at)
        }
    }

    pub fn withdraw(user_id: UserId, account_no: AccountNumber, amount: Amount, at: DateTime<Utc>) -> Self {
        Self {
            account_no: Some(account_no),
            ..Self::base(NotificationKind::Withdraw, user_id, amount.minor_units(), at)
        }
    }

    pub fn account_opened(
        user_id: UserId,
        account_no: AccountNumber,
        opening_balance: Balance,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_no: Some(account_no),
            ..Self::base(
                NotificationKind::AccountOpened,
                user_id,
                opening_balance.minor_units(),
                at,
            )
        }
    }

    /// The pair of notifications for a transfer: one to the sender, one to the receiver.
    pub fn transfer_pair(
        sender: UserId,
        receiver: UserId,
        from: AccountNumber,
        to: AccountNumber,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> [Self; 2] {
        let sent = Self {
            from: Some(from.clone()),
            to: Some(to.clone()),
            ..Self::base(NotificationKind::TransferSent, sender, amount.minor_units(), at)
        };
        let received = Self {
            from: Some(from),
            to: Some(to),
            ..Self::base(NotificationKind::TransferReceived, receiver, amount.minor_units(), at)
        };
        [sent, received]
    }

    pub fn with_contact(mut self, to_email: Option<String>) -> Self {
        self.to_email = to_email;
        self
    }
}

impl Event for LedgerNotification {
    fn event_type(&self) -> &'static str {
        self.kind.as_str()
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
