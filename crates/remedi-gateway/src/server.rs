use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use remedi_core::{ChatPipeline, SessionStore};

use crate::error::GatewayError;
use crate::router::build_router;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ChatPipeline>,
    pub sessions: Arc<SessionStore>,
    pub started_at: Instant,
}

pub struct GatewayServer {
    addr: SocketAddr,
    rate_limit: u32,
    max_body_size: usize,
    pipeline: Arc<ChatPipeline>,
    sessions: Arc<SessionStore>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        pipeline: Arc<ChatPipeline>,
        sessions: Arc<SessionStore>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        Self {
            addr,
            rate_limit: 120,
            max_body_size: 65_536,
            pipeline,
            sessions,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_rate_limit(mut self, limit: u32) -> Self {
        self.rate_limit = limit;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Start the HTTP server and run it until shutdown is signalled.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal
    /// I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let state = AppState {
            pipeline: self.pipeline,
            sessions: self.sessions,
            started_at: Instant::now(),
        };

        let router = build_router(state, self.rate_limit, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("chat service listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            tracing::info!("chat service shutting down");
        })
        .await
        .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use remedi_core::{Retriever, RetrieverConfig};
    use remedi_llm::mock::MockProvider;
    use remedi_memory::in_memory_store::InMemoryStore;

    fn test_server(bind: &str, port: u16) -> GatewayServer {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(InMemoryStore::new());
        let retriever = Retriever::new(store, Arc::clone(&provider) as _, RetrieverConfig::default());
        let pipeline = Arc::new(ChatPipeline::new(retriever, provider));
        let sessions = Arc::new(SessionStore::new(8, 16, Duration::from_secs(60)));
        let (_tx, rx) = watch::channel(false);
        GatewayServer::new(bind, port, pipeline, sessions, rx)
    }

    #[test]
    fn server_builder_chain() {
        let server = test_server("127.0.0.1", 8090)
            .with_rate_limit(60)
            .with_max_body_size(512);

        assert_eq!(server.rate_limit, 60);
        assert_eq!(server.max_body_size, 512);
    }

    #[test]
    fn server_invalid_bind_fallback() {
        let server = test_server("not_an_ip", 9999);
        assert_eq!(server.addr.port(), 9999);
        assert!(server.addr.ip().is_loopback());
    }
}
