pub(crate) mod migrate;
pub(crate) mod poller;
pub(crate) mod serve;
pub(crate) mod worker;

/// Resolves once a SIGTERM (or platform-equivalent Ctrl-C) is observed.
/// Every long-running loop checks this between iterations rather than
/// being forcibly cancelled mid-iteration, so an in-flight handler or
/// poll cycle always finishes — a stopped process leaves no job stuck in
/// `running` beyond what the startup reconciliation sweep already covers.
pub(crate) async fn stop_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
