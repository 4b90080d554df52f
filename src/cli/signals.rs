//! Signal handling for graceful shutdown

use crate::engine::CancellationToken;
use tracing::warn;

/// Cancel `token` on the first SIGINT or SIGTERM
///
/// A run in flight stops before its next node; the node currently executing
/// is allowed to finish.
pub async fn setup_signal_handlers(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigint.recv() => {
                eprintln!("\nReceived SIGINT, stopping after the current node...");
            }
            _ = sigterm.recv() => {
                eprintln!("\nReceived SIGTERM, stopping after the current node...");
            }
        }

        token.cancel();
    }

    #[cfg(not(unix))]
    {
        use tokio::signal::ctrl_c;

        if let Err(e) = ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }
        eprintln!("\nReceived Ctrl+C, stopping after the current node...");
        token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handler_waits_without_signal() {
        let token = CancellationToken::new();
        let handle = tokio::spawn(setup_signal_handlers(token.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!token.is_cancelled());
        assert!(!handle.is_finished());

        handle.abort();
    }
}
