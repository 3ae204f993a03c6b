//! `StagehandServer` builder and accept loop.
//!
//! This is the entry point for running a Stagehand server. It ties
//! together all the layers: transport → protocol → session → stage.

use std::net::SocketAddr;
use std::sync::Arc;

use stagehand_session::{Authenticator, SessionConfig};
use stagehand_stage::StageConfig;
use stagehand_store::{CharacterStore, InMemoryStore};
use stagehand_transport::{Transport, TransportError, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{ServerConfig, ServerContext, StagehandError};

/// Builder for configuring and starting a Stagehand server.
///
/// # Example
///
/// ```rust,ignore
/// use stagehand::prelude::*;
///
/// let server = StagehandServerBuilder::new()
///     .bind("0.0.0.0:54001")
///     .build(DevAuthenticator)
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone, Default)]
pub struct StagehandServerBuilder {
    config: ServerConfig,
}

impl StagehandServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration, e.g. one loaded from a file.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the stage configuration.
    pub fn stage_config(mut self, config: StageConfig) -> Self {
        self.config.stage = config;
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Binds the listener with an in-memory character store.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<StagehandServer<A, InMemoryStore>, StagehandError> {
        let store = InMemoryStore::with_config(self.config.store.clone());
        self.build_with_store(auth, store).await
    }

    /// Binds the listener with the given character store.
    pub async fn build_with_store<A: Authenticator, S: CharacterStore>(
        self,
        auth: A,
        store: S,
    ) -> Result<StagehandServer<A, S>, StagehandError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        Ok(StagehandServer {
            transport,
            ctx: Arc::new(ServerContext::new(self.config, store)),
            auth: Arc::new(auth),
        })
    }
}

/// A bound Stagehand server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct StagehandServer<A, S> {
    transport: WebSocketTransport,
    ctx: Arc<ServerContext<S>>,
    auth: Arc<A>,
}

impl<A: Authenticator, S: CharacterStore> StagehandServer<A, S> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.transport.local_addr()
    }

    /// Shared state, for inspection while the server runs.
    pub fn context(&self) -> Arc<ServerContext<S>> {
        Arc::clone(&self.ctx)
    }

    /// Runs the accept loop.
    ///
    /// Spawns a handler task for each accepted connection. Runs until the
    /// task is dropped.
    pub async fn run(mut self) -> Result<(), StagehandError> {
        tracing::info!(addr = ?self.local_addr().ok(), "stagehand server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let ctx = Arc::clone(&self.ctx);
                    let auth = Arc::clone(&self.auth);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, ctx, auth).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
