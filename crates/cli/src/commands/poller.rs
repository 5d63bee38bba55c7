use std::time::Duration;

use anyhow::{Context, Result};

use triage_service::config::EngineConfig;

use crate::runtime::Runtime;

pub(crate) async fn run() -> Result<()> {
    let config = EngineConfig::from_env().context("loading configuration from environment")?;
    let poll_interval = Duration::from_secs(config.matrix_poll_interval_seconds);
    let runtime = Runtime::bootstrap(config).await?;
    let mut poller = runtime.ingress_poller();

    tracing::info!("starting ingress poller");
    let stop = super::stop_signal();
    tokio::pin!(stop);
    loop {
        tokio::select! {
            biased;
            () = &mut stop => {
                tracing::info!("stop signal received, exiting ingress poller after current cycle");
                break;
            },
            result = poller.poll_once() => {
                match result {
                    Ok(dispatched) => tracing::debug!(dispatched, "ingress poll cycle complete"),
                    Err(e) => tracing::error!(error = %e, "ingress poll cycle failed"),
                }
                tokio::time::sleep(poll_interval).await;
            },
        }
    }
    Ok(())
}
