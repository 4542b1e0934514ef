//! SIGINT / SIGTERM handling.
//!
//! A signal cancels the workflow token. The running step finishes, then the
//! workflow takes its failure path so jobs are unlocked and instances
//! cleaned up before the process exits.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token handed to the workflow.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the workflow.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            info!("Stopping after the current step; locked jobs will be unlocked");
        }
        self.token.cancel();
    }

    /// Wait for SIGTERM or SIGINT, then cancel the workflow.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), cancelling...");
            }
            _ = terminate => {
                info!("Received SIGTERM, cancelling...");
            }
        }

        self.trigger();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_cancels_token() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();
        assert!(!token.is_cancelled());

        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });

        coordinator.trigger();
        handle.await.unwrap();
        assert!(coordinator.token().is_cancelled());
    }
}
