use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transactions))
        .route("/:id", get(get_transaction))
}

/// Records against any of the caller's accounts, oldest first.
pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.engine.transactions_for_owner(caller.user_id()).await {
        Ok(records) => {
            let items = records.iter().map(dto::transaction_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_transaction_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.engine.owned_transaction(id, caller.user_id()).await {
        Ok(record) => (StatusCode::OK, Json(dto::transaction_to_json(&record))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
