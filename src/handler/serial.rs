//! Serial/USB handler.
//!
//! This module provides the handler for CUL sticks attached via USB, which
//! show up as a serial port (`/dev/ttyACM0`, `COM3`, ...).

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_serial::SerialPortBuilderExt;

use crate::error::{Error, Result};
use crate::handler::{CulHandler, LineConnection};
use crate::listener::Listeners;
use crate::registry::HandlerFactory;
use crate::types::Mode;

/// Default baud rate for culfw devices.
pub const DEFAULT_BAUD_RATE: u32 = 9_600;

/// Default delay between opening the port and the first command.
pub const DEFAULT_CONNECTION_DELAY: Duration = Duration::from_millis(100);

/// Configuration for a serial handler.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyACM0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Delay after opening before the port is handed to the caller.
    pub connection_delay: Duration,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            connection_delay: DEFAULT_CONNECTION_DELAY,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the connection delay.
    #[must_use]
    pub const fn connection_delay(mut self, delay: Duration) -> Self {
        self.connection_delay = delay;
        self
    }
}

/// Handler for a serially attached CUL.
pub struct SerialHandler {
    config: SerialConfig,
    mode: Mode,
    listeners: Listeners,
    connection: LineConnection,
}

impl SerialHandler {
    /// Creates a closed handler.
    #[must_use]
    pub fn new(config: SerialConfig, mode: Mode) -> Self {
        Self {
            config,
            mode,
            listeners: Listeners::new(),
            connection: LineConnection::new(),
        }
    }

    /// Factory for the `serial` device type, using default port settings.
    #[must_use]
    pub fn factory() -> HandlerFactory {
        Self::factory_with(|config| config)
    }

    /// Factory for the `serial` device type that lets the caller adjust the
    /// configuration built for each address.
    pub fn factory_with<F>(configure: F) -> HandlerFactory
    where
        F: Fn(SerialConfig) -> SerialConfig + Send + Sync + 'static,
    {
        Arc::new(move |address: &str, mode: &Mode| {
            if address.is_empty() {
                return Err(Error::device("serial device needs a port path"));
            }
            let config = configure(SerialConfig::new(address));
            Ok(Arc::new(Self::new(config, mode.clone())) as Arc<dyn CulHandler>)
        })
    }
}

impl CulHandler for SerialHandler {
    fn open(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.connection.is_attached() {
                return Ok(());
            }

            tracing::info!("opening serial port: {}", self.config.port);

            let stream = tokio_serial::new(&self.config.port, self.config.baud_rate)
                .open_native_async()
                .map_err(Error::Serial)?;

            tokio::time::sleep(self.config.connection_delay).await;

            let (reader, writer) = tokio::io::split(stream);
            self.connection
                .attach(reader, writer, self.listeners.clone())
                .await;

            tracing::info!("opened serial port: {}", self.config.port);
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.connection.detach().await {
                tracing::info!("closed serial port: {}", self.config.port);
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
        &self.config.port
    }

    fn mode(&self) -> &Mode {
        &self.mode
    }

    fn listeners(&self) -> &Listeners {
        &self.listeners
    }
}

/// Lists available serial ports.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
