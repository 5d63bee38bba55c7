//! CLI entrypoint for the triage workflow engine: an HTTP API server, a
//! Matrix ingress poller, a background job worker, and a migration runner,
//! each runnable as its own process so they can be scaled independently.

mod commands;
mod runtime;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "triage-automation")]
#[command(about = "Clinical triage workflow orchestration engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API: decision webhook, widget API, monitoring read model.
    Serve {
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Run the Matrix ingress long-poll loop.
    Poller,
    /// Run the background job worker.
    Worker {
        #[arg(long)]
        worker_id: Option<String>,
    },
    /// Connect to the database and run pending migrations, then exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => commands::serve::run(host, port).await?,
        Commands::Poller => commands::poller::run().await?,
        Commands::Worker { worker_id } => commands::worker::run(worker_id).await?,
        Commands::Migrate => commands::migrate::run().await?,
    }

    Ok(())
}
