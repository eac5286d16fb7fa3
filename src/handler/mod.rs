//! Protocol handlers.
//!
//! A handler owns the transport to one physical device and the set of
//! listeners receiving its lines. The session layer only talks to handlers
//! through [`CulHandler`]; concrete transports live in the submodules:
//! - [`serial`] - USB/serial attached devices (`serial:/dev/ttyACM0`)
//! - [`network`] - devices behind a TCP bridge (`network:cul.local:2323`)

pub mod connection;
pub mod network;
pub mod serial;

#[cfg(test)]
pub(crate) mod mock;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::listener::Listeners;
use crate::protocol::command;
use crate::types::Mode;

pub use connection::LineConnection;
pub use network::{NetworkConfig, NetworkHandler};
pub use serial::{SerialConfig, SerialHandler};

/// A live session to one culfw device.
///
/// Implementations use interior mutability: a handler is shared between the
/// manager and every caller that acquired it.
pub trait CulHandler: Send + Sync {
    /// Opens the underlying transport and starts delivering received lines
    /// to the listeners. Opening an open handler is a no-op.
    fn open(&self) -> BoxFuture<'_, Result<()>>;

    /// Closes the underlying transport. Closing a closed handler is a no-op.
    fn close(&self) -> BoxFuture<'_, Result<()>>;

    /// Sends one command line to the device.
    fn send<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Returns true while the transport is open.
    fn is_open(&self) -> bool;

    /// The transport address this handler was built for.
    fn address(&self) -> &str;

    /// The RF mode this handler was built for. Never changes.
    fn mode(&self) -> &Mode;

    /// The listeners notified of received lines and transport errors.
    fn listeners(&self) -> &Listeners;

    /// Returns true if any listener is registered.
    fn has_listeners(&self) -> bool {
        self.listeners().has_listeners()
    }

    /// Command requesting the firmware version.
    fn version_query(&self) -> &str {
        command::VERSION_QUERY
    }

    /// Command returning the device to its default mode on release.
    fn reset_command(&self) -> &str {
        command::RESET
    }
}

impl std::fmt::Debug for dyn CulHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CulHandler")
            .field("address", &self.address())
            .field("mode", &self.mode().name())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
