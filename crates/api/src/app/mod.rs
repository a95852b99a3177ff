//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/notifier/engine construction from `LedgerConfig`
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request bodies and JSON mapping
//! - `errors.rs`: `LedgerError` to status + `{error, message}` body

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use bankledger_infra::LedgerConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(jwt_secret: String, config: &LedgerConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(router_with(jwt_secret, services))
}

/// Router over already-built services.
pub fn router_with(jwt_secret: String, services: Arc<services::AppServices>) -> Router {
    let jwt = Arc::new(bankledger_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState {
        jwt,
        contacts: services.contacts.clone(),
    };

    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
