use anyhow::{Context, Result};
use std::sync::Arc;

use triage_http::{create_router, AppState};
use triage_service::config::EngineConfig;

use crate::runtime::Runtime;

pub(crate) async fn run(host: String, port: u16) -> Result<()> {
    let config = EngineConfig::from_env().context("loading configuration from environment")?;
    let webhook_hmac_secret = config.webhook_hmac_secret.clone();
    let runtime = Runtime::bootstrap(config).await?;

    let state = Arc::new(AppState {
        storage: runtime.storage.clone(),
        doctor_decision: runtime.doctor_decision.clone(),
        webhook_hmac_secret,
        token_service: runtime.token_service.clone(),
    });

    let router = create_router(state);
    let addr = format!("{host}:{port}");
    tracing::info!(%addr, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(super::stop_signal())
        .await
        .context("serving HTTP API")?;

    Ok(())
}
