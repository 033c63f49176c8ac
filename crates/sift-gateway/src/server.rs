use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use sift_core::QueryService;
use sift_index::ingest::Ingestor;

use crate::error::GatewayError;
use crate::router::build_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub engine: Arc<dyn QueryService>,
    pub ingestor: Arc<Ingestor>,
    pub started_at: Instant,
}

pub struct GatewayServer {
    addr: SocketAddr,
    auth_token: Option<String>,
    max_body_size: usize,
    engine: Arc<dyn QueryService>,
    ingestor: Arc<Ingestor>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        engine: Arc<dyn QueryService>,
        ingestor: Arc<Ingestor>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if bind == "0.0.0.0" {
            tracing::warn!("gateway binding to 0.0.0.0 — ensure this is intended for production");
        }

        Self {
            addr,
            auth_token: None,
            max_body_size: 1_048_576,
            engine,
            ingestor,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_auth(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Start the HTTP gateway server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal
    /// I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let state = AppState {
            engine: self.engine,
            ingestor: self.ingestor,
            started_at: Instant::now(),
        };

        let router = build_router(state, self.auth_token, self.max_body_size);

        let listener =
            tokio::net::TcpListener::bind(self.addr)
                .await
                .map_err(|source| GatewayError::Bind {
                    addr: self.addr.to_string(),
                    source,
                })?;
        tracing::info!("gateway listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await?;
        Ok(())
    }
}
