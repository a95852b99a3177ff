use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use bankledger_core::TransactionId;
use bankledger_infra::LedgerError;
use bankledger_ledger::AccountType;

use crate::app::dto::AmountRequest;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let status = match &err {
        LedgerError::InvalidAmount(_) | LedgerError::SameAccount => StatusCode::BAD_REQUEST,
        LedgerError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::AccountTypeExists(_) | LedgerError::DuplicateAccountNumber(_) => {
            StatusCode::CONFLICT
        }
        LedgerError::AccessDenied => StatusCode::FORBIDDEN,
        LedgerError::AccountNotFound | LedgerError::TransactionNotFound => StatusCode::NOT_FOUND,
        LedgerError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::StorageFailure(msg) => {
            error!(error = %msg, "ledger storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Amount from a deposit/withdraw/transfer body.
///
/// A missing, fractional or non-numeric `amount` is `invalid_amount`; a body
/// that is not JSON at all is `invalid_request`.
pub fn amount_from_body(
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<i64, axum::response::Response> {
    match body {
        Ok(Json(req)) => Ok(req.amount),
        Err(JsonRejection::JsonDataError(e)) => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_amount",
            format!("amount must be an integer number of minor units: {}", e.body_text()),
        )),
        Err(other) => Err(invalid_request(other)),
    }
}

/// Any other JSON body; every rejection is `invalid_request`.
pub fn request_body<T>(
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, axum::response::Response> {
    body.map(|Json(req)| req).map_err(invalid_request)
}

fn invalid_request(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
}

pub fn parse_account_type(s: &str) -> Result<AccountType, axum::response::Response> {
    s.parse::<AccountType>()
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_account_type", e.to_string()))
}

pub fn parse_transaction_id(s: &str) -> Result<TransactionId, axum::response::Response> {
    s.parse::<TransactionId>()
        .map_err(|_| json_error(StatusCode::NOT_FOUND, "transaction_not_found", "transaction not found"))
}
