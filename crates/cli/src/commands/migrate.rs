use anyhow::{Context, Result};

use triage_service::config::EngineConfig;
use triage_storage::PgStorage;

pub(crate) async fn run() -> Result<()> {
    let config = EngineConfig::from_env().context("loading configuration from environment")?;
    let storage = PgStorage::connect(&config.database_url).await.context("connecting to database")?;
    storage.migrate().await.context("running migrations")?;
    tracing::info!("migrations applied");
    Ok(())
}
