use anyhow::Context;

use bankledger_infra::LedgerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bankledger_observability::init();

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let config = LedgerConfig::from_env().context("reading ledger configuration")?;

    let app = bankledger_api::app::build_app(jwt_secret, &config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
