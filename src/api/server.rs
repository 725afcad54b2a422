//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::router;
use crate::config::ServerConfig;
use crate::error::{ConciergeError, Result};
use crate::pipeline::ChatPipeline;

/// HTTP server for the chat endpoint.
pub struct ApiServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Proxies whose `X-Forwarded-For` entries are trusted
    trusted_proxy_hops: usize,
    /// The pipeline serving chat requests
    pipeline: Arc<ChatPipeline>,
}

impl ApiServer {
    /// Create a new HTTP server.
    pub fn new(config: &ServerConfig, pipeline: Arc<ChatPipeline>) -> Self {
        Self {
            addr: config.listen_addr,
            trusted_proxy_hops: config.trusted_proxy_hops,
            pipeline,
        }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(
            addr = %self.addr,
            trusted_proxy_hops = self.trusted_proxy_hops,
            "Starting HTTP server for chat API with graceful shutdown"
        );

        axum::serve(
            listener,
            router(self.pipeline, self.trusted_proxy_hops)
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            ConciergeError::Io(e)
        })
    }
}
