//! OS signal shutdown trigger.
//!
//! Unix: SIGINT, SIGTERM, SIGQUIT, plus [`tokio::signal::ctrl_c`].
//! Elsewhere: Ctrl-C only.

use tracing::{error, info};

/// Completes on the first termination signal and returns its name.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = tokio::signal::ctrl_c() => "ctrl-c",
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

/// Shutdown trigger handed to the orchestrator. If the handlers cannot be
/// installed it falls back to Ctrl-C alone.
pub async fn shutdown_trigger() {
    match wait_for_shutdown_signal().await {
        Ok(name) => info!(signal = name, "shutdown signal received"),
        Err(e) => {
            error!(error = %e, "cannot install signal handlers, waiting for ctrl-c");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for ctrl-c, shutting down");
            }
        }
    }
}
