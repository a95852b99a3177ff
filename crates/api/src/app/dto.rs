use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use bankledger_infra::MutationReceipt;
use bankledger_ledger::{Account, TransactionRecord};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub account_type: String,
    #[serde(default)]
    pub initial_balance: i64,
}

/// Body of deposit, withdraw and transfer. Minor units.
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: i64,
}

// -------------------------
// Response mapping
// -------------------------

pub fn account_to_json(a: &Account) -> JsonValue {
    json!({
        "id": a.id.raw(),
        "account_no": a.number.as_str(),
        "owner_id": a.owner.to_string(),
        "account_type": a.account_type.as_str(),
        "balance": a.balance.minor_units(),
        "created_at": a.created_at.to_rfc3339(),
        "updated_at": a.updated_at.to_rfc3339(),
    })
}

pub fn transaction_to_json(t: &TransactionRecord) -> JsonValue {
    json!({
        "id": t.id.raw(),
        "posting_id": t.posting_id.to_string(),
        "type": t.kind.as_str(),
        "amount": t.amount.minor_units(),
        "account_id": t.account_id.raw(),
        "from_account_id": t.from_account_id.map(|id| id.raw()),
        "to_account_id": t.to_account_id.map(|id| id.raw()),
        "status": t.status.as_str(),
        "occurred_at": t.occurred_at.to_rfc3339(),
    })
}

pub fn receipt_to_json(r: &MutationReceipt) -> JsonValue {
    json!({
        "balance": r.balance.minor_units(),
        "transactions": r.transactions.iter().map(transaction_to_json).collect::<Vec<_>>(),
    })
}
