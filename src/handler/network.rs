//! TCP handler for CULs reachable over the network, e.g. a CUNO or a stick
//! exported through ser2net.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::handler::{CulHandler, LineConnection};
use crate::listener::Listeners;
use crate::registry::HandlerFactory;
use crate::types::Mode;

/// Default timeout for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a network handler.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Remote address as `host:port`.
    pub address: String,
    /// How long to wait for the connection to be established.
    pub connect_timeout: Duration,
}

impl NetworkConfig {
    /// Creates a new network configuration with default settings.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Handler for a CUL behind a TCP socket.
pub struct NetworkHandler {
    config: NetworkConfig,
    mode: Mode,
    listeners: Listeners,
    connection: LineConnection,
}

impl NetworkHandler {
    /// Creates a closed handler.
    #[must_use]
    pub fn new(config: NetworkConfig, mode: Mode) -> Self {
        Self {
            config,
            mode,
            listeners: Listeners::new(),
            connection: LineConnection::new(),
        }
    }

    /// Factory for the `network` device type.
    #[must_use]
    pub fn factory() -> HandlerFactory {
        Arc::new(|address: &str, mode: &Mode| {
            if !address.contains(':') {
                return Err(Error::device(format!(
                    "network address {address:?} is not host:port"
                )));
            }
            let handler = Self::new(NetworkConfig::new(address), mode.clone());
            Ok(Arc::new(handler) as Arc<dyn CulHandler>)
        })
    }
}

impl CulHandler for NetworkHandler {
    fn open(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.connection.is_attached() {
                return Ok(());
            }

            tracing::info!("connecting to {}", self.config.address);

            let timeout = self.config.connect_timeout;
            let stream =
                tokio::time::timeout(timeout, TcpStream::connect(self.config.address.as_str()))
                    .await
                    .map_err(|_| Error::Timeout {
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    })??;

            if let Err(e) = stream.set_nodelay(true) {
                tracing::warn!("failed to set TCP_NODELAY: {}", e);
            }

            let (reader, writer) = stream.into_split();
            self.connection
                .attach(reader, writer, self.listeners.clone())
                .await;

            tracing::info!("connected to {}", self.config.address);
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.connection.detach().await {
                tracing::info!("disconnected from {}", self.config.address);
            }
            Ok(())
        })
    }

    fn send<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.connection.send(command))
    }

    fn is_open(&self) -> bool {
        self.connection.is_attached()
    }

    fn address(&self) -> &str {
        &self.config.address
    }

    fn mode(&self) -> &Mode {
        &self.mode
    }

    fn listeners(&self) -> &Listeners {
        &self.listeners
    }
}
