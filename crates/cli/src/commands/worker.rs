use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use triage_service::config::EngineConfig;

use crate::runtime::Runtime;

pub(crate) async fn run(worker_id: Option<String>) -> Result<()> {
    let config = EngineConfig::from_env().context("loading configuration from environment")?;
    let poll_interval = Duration::from_secs(config.worker_poll_interval_seconds);
    let runtime = Runtime::bootstrap(config).await?;

    let process_started_at = Utc::now();
    let requeued = runtime.recovery.reconcile_running_jobs(process_started_at).await.context("reconciling stale running jobs")?;
    if requeued > 0 {
        tracing::info!(requeued, "requeued jobs left running by a crashed worker");
    }
    let recovered = runtime.recovery.recover().await.context("recovering non-cleaned cases")?;
    if recovered > 0 {
        tracing::info!(recovered, "re-enqueued jobs for non-cleaned cases");
    }

    let worker_id = worker_id.unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));
    let worker = runtime.worker_runtime(worker_id.clone());

    tracing::info!(worker_id, "starting job worker");
    let stop = super::stop_signal();
    tokio::pin!(stop);
    loop {
        tokio::select! {
            biased;
            () = &mut stop => {
                tracing::info!("stop signal received, exiting job worker once in-flight handlers complete");
                break;
            },
            result = worker.run_once() => {
                match result {
                    Ok(0) => tokio::time::sleep(poll_interval).await,
                    Ok(claimed) => tracing::debug!(claimed, "job batch processed"),
                    Err(e) => {
                        tracing::error!(error = %e, "job batch claim failed");
                        tokio::time::sleep(poll_interval).await;
                    },
                }
            },
        }
    }
    Ok(())
}
