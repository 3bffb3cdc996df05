pub mod handler;
pub mod transport;

use crate::{Config, Error, Result};
use rmcp::{service::ServiceExt, transport::stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use handler::ScholarServerHandler;

pub struct Server {
    config: Arc<Config>,
    cancellation_token: CancellationToken,
}

impl Server {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Serve MCP over stdio until the transport closes or a shutdown signal
    /// arrives. After a signal, in-flight work gets the configured grace
    /// period to drain before the process gives up on the transport.
    pub async fn run(&self) -> Result<()> {
        info!("Starting MCP server infrastructure");

        let handler = ScholarServerHandler::new(Arc::clone(&self.config))?;

        transport::validate_stdio_transport()
            .map_err(|e| Error::Service(format!("Transport validation failed: {e}")))?;

        self.spawn_signal_listener();

        info!("Starting MCP server on stdio transport");

        let serve = self.run_mcp_server(handler);
        tokio::pin!(serve);

        let server_result = tokio::select! {
            result = &mut serve => result,
            () = self.cancellation_token.cancelled() => {
                info!("Shutdown requested, draining in-flight work");
                let grace = Duration::from_secs(self.config.server.shutdown_timeout_secs);
                match tokio::time::timeout(grace, &mut serve).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            grace_secs = self.config.server.shutdown_timeout_secs,
                            "Grace period elapsed before the transport closed"
                        );
                        Ok(())
                    }
                }
            }
        };

        info!("MCP server shutdown complete");
        server_result
    }

    /// SIGTERM/SIGINT both map onto the cancellation token
    fn spawn_signal_listener(&self) {
        let shutdown_token = self.cancellation_token.clone();
        tokio::spawn(async move {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to setup SIGTERM handler");
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
                .expect("Failed to setup SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }

            shutdown_token.cancel();
        });
    }

    async fn run_mcp_server(&self, handler: ScholarServerHandler) -> Result<()> {
        let transport = stdio();

        let server = handler
            .serve(transport)
            .await
            .map_err(|e| Error::Service(format!("Failed to start MCP server: {e}")))?;

        let quit_reason = server
            .waiting()
            .await
            .map_err(|e| Error::Service(format!("MCP server error: {e}")))?;

        info!("MCP server completed with reason: {:?}", quit_reason);
        Ok(())
    }

    /// Request shutdown from outside the signal path
    pub fn shutdown(&self) {
        warn!("Initiating server shutdown");
        self.cancellation_token.cancel();
    }

    /// Check if the server has been requested to shutdown
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Get the server configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creation() {
        let config = Config::default();
        let server = Server::new(config);
        assert!(!server.is_shutdown_requested());
    }

    #[test]
    fn test_shutdown_sets_cancellation() {
        let config = Config::default();
        let server = Server::new(config);

        server.shutdown();
        assert!(server.is_shutdown_requested());

        // Repeat requests are harmless
        server.shutdown();
        assert!(server.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_cancellation_token_observed() {
        let server = Server::new(Config::default());
        let token = server.cancellation_token.clone();

        server.shutdown();
        // A pending wait on the token resolves once shutdown was requested
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("cancellation should already be signalled");
    }
}
