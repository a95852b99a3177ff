use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(open_account).get(list_accounts))
        .route("/transfer/:from/:to", post(transfer))
        .route("/:account_no", get(get_account))
        .route("/:account_no/balance", get(get_balance))
        .route("/:account_no/deposit", post(deposit))
        .route("/:account_no/withdraw", post(withdraw))
        .route("/:account_no/transactions", get(list_account_transactions))
}

pub async fn open_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    body: Result<Json<dto::OpenAccountRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::request_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let account_type = match errors::parse_account_type(&body.account_type) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match services
        .engine
        .open_account(caller.user_id(), account_type, body.initial_balance)
        .await
    {
        Ok(account) => (StatusCode::CREATED, Json(dto::account_to_json(&account))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.engine.accounts_for_owner(caller.user_id()).await {
        Ok(accounts) => {
            let items = accounts.iter().map(dto::account_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(account_no): Path<String>,
) -> axum::response::Response {
    match services.engine.owned_account(&account_no, caller.user_id()).await {
        Ok(account) => (StatusCode::OK, Json(dto::account_to_json(&account))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(account_no): Path<String>,
) -> axum::response::Response {
    match services.engine.owned_account(&account_no, caller.user_id()).await {
        Ok(account) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "account_no": account.number.as_str(),
                "balance": account.balance.minor_units(),
            })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Anyone authenticated may deposit into any existing account.
pub async fn deposit(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_no): Path<String>,
    body: Result<Json<dto::AmountRequest>, JsonRejection>,
) -> axum::response::Response {
    let amount = match errors::amount_from_body(body) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    match services.engine.deposit(&account_no, amount).await {
        Ok(receipt) => (StatusCode::OK, Json(dto::receipt_to_json(&receipt))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn withdraw(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(account_no): Path<String>,
    body: Result<Json<dto::AmountRequest>, JsonRejection>,
) -> axum::response::Response {
    let amount = match errors::amount_from_body(body) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    match services
        .engine
        .withdraw(&account_no, caller.user_id(), amount)
        .await
    {
        Ok(receipt) => (StatusCode::OK, Json(dto::receipt_to_json(&receipt))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path((from, to)): Path<(String, String)>,
    body: Result<Json<dto::AmountRequest>, JsonRejection>,
) -> axum::response::Response {
    let amount = match errors::amount_from_body(body) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    match services
        .engine
        .transfer(&from, &to, caller.user_id(), amount)
        .await
    {
        Ok(receipt) => (StatusCode::OK, Json(dto::receipt_to_json(&receipt))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_account_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(account_no): Path<String>,
) -> axum::response::Response {
    if let Err(e) = services.engine.owned_account(&account_no, caller.user_id()).await {
        return errors::ledger_error_to_response(e);
    }

    match services.engine.transactions_for(&account_no).await {
        Ok(records) => {
            let items = records.iter().map(dto::transaction_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
