//! `FourlineServer` builder and server loop.
//!
//! This is the entry point for running a Fourline server. It ties the
//! layers together: transport → protocol → hub → arena.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fourline_game::GameConfig;
use fourline_hub::{Authenticator, HubConfig};
use fourline_lobby::LobbyConfig;
use fourline_protocol::{Codec, JsonCodec};
use fourline_transport::{Transport, TransportError, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{AnalyticsSink, Arena, FourlineError, GameStore, MemoryStore, ServerConfig, TracingAnalytics};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<S, K, A, C> {
    pub(crate) arena: Arena<S, K>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) handshake_timeout: Duration,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Fourline server.
///
/// # Example
///
/// ```rust,no_run
/// use fourline::{DevAuthenticator, FourlineServerBuilder};
///
/// # async fn run() -> Result<(), fourline::FourlineError> {
/// let server = FourlineServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(DevAuthenticator)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct FourlineServerBuilder {
    config: ServerConfig,
}

impl FourlineServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.config.game = config;
        self
    }

    pub fn lobby_config(mut self, config: LobbyConfig) -> Self {
        self.config.lobby = config;
        self
    }

    pub fn hub_config(mut self, config: HubConfig) -> Self {
        self.config.hub = config;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Builds the server with an in-memory store and log-only analytics.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<FourlineServer<MemoryStore, TracingAnalytics, A, JsonCodec>, FourlineError> {
        self.build_with(auth, MemoryStore::new(), TracingAnalytics)
            .await
    }

    /// Builds the server with the given collaborators. Binds the listener
    /// and starts the arena's background tasks.
    pub async fn build_with<A, S, K>(
        self,
        auth: A,
        store: S,
        analytics: K,
    ) -> Result<FourlineServer<S, K, A, JsonCodec>, FourlineError>
    where
        A: Authenticator,
        S: GameStore,
        K: AnalyticsSink,
    {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let state = Arc::new(ServerState {
            arena: Arena::new(&self.config, store, analytics),
            auth,
            codec: JsonCodec,
            handshake_timeout: self.config.handshake_timeout,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(FourlineServer { transport, state })
    }
}

impl Default for FourlineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Fourline server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct FourlineServer<S, K, A, C> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, K, A, C>>,
}

impl<S, K, A, C> FourlineServer<S, K, A, C>
where
    S: GameStore,
    K: AnalyticsSink,
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, FourlineError> {
        Ok(self.transport.local_addr()?)
    }

    /// The arena behind this server.
    pub fn arena(&self) -> &Arena<S, K> {
        &self.state.arena
    }

    /// Runs the accept loop until the transport shuts down.
    ///
    /// Each connection is handled on its own task.
    pub async fn run(mut self) -> Result<(), FourlineError> {
        tracing::info!("Fourline server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(TransportError::Shutdown) => break,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }

        self.state.arena.shutdown();
        Ok(())
    }
}
