use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{self, ApiState};
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::engine::ReviewEngine;
use crate::storage::Storage;

/// Wires storage, the assignment engine, the dispatcher and the HTTP API.
pub struct Server {
    pub config: ServerConfig,
    pub engine: Arc<ReviewEngine>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Server {
    pub fn new(config: ServerConfig, storage: Arc<dyn Storage>) -> Self {
        let engine = Arc::new(ReviewEngine::new(storage));
        let dispatcher = Arc::new(Dispatcher::new(config.dispatcher.clone(), engine.clone()));
        Self {
            config,
            engine,
            dispatcher,
        }
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            engine: self.engine.clone(),
            dispatcher: self.dispatcher.clone(),
            request_timeout: self.config.request_timeout(),
        }
    }

    /// Run until `shutdown` fires.
    ///
    /// 1. Starts the dispatcher workers
    /// 2. Serves the HTTP API, draining open connections on shutdown
    /// 3. Stops the dispatcher, answering queued jobs with `Canceled`
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address cannot be bound or the HTTP
    /// server fails. The dispatcher is stopped in either case.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
        self.dispatcher.start().await;

        let served = match TcpListener::bind(self.config.listen_addr).await {
            Ok(listener) => api::serve(listener, self.api_state(), shutdown).await,
            Err(e) => {
                tracing::error!(addr = %self.config.listen_addr, error = %e, "Failed to bind HTTP API");
                Err(e)
            }
        };

        self.dispatcher.shutdown().await;
        served?;
        Ok(())
    }
}
