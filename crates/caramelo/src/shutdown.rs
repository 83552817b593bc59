// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination.
//!
//! A single [`CancellationToken`] fans out to the webhook server and
//! both dispatch loops; it is cancelled on SIGINT or SIGTERM.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawn a background task that cancels the returned token on the
/// first SIGINT (Ctrl+C) or SIGTERM.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        handler_token.cancel();
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, falling back to Ctrl+C only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Ctrl+C handler failed");
            }
            info!("shutdown signal received");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler failed");
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_starts_uncancelled() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
        token.cancel();
    }
}
