//! # cul
//!
//! Session layer for culfw based CUL RF transceivers.
//!
//! This library owns the connections to CUL sticks: it hands out one
//! exclusively owned handler per physical device, runs the culfw handshake
//! before a handler is usable, fans received lines out to listeners, and
//! closes devices once nobody listens anymore.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Serial and TCP attached devices, more types pluggable by prefix
//! - One handler per device, at most one RF mode per device
//! - Listener fan-out with an async subscription adapter
//! - Fixed-interval reconnection
//!
//! ## Quick Start
//!
//! ```no_run
//! use cul::{CulManager, Mode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cul::Error> {
//!     let manager = CulManager::with_defaults();
//!
//!     let handler = manager.acquire("serial:/dev/ttyACM0", &Mode::slow_rf()).await?;
//!     let mut events = handler.listeners().subscribe(64);
//!
//!     if let Some(event) = events.recv().await {
//!         println!("received: {event:?}");
//!     }
//!
//!     drop(events);
//!     manager.release(&handler).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Device names, firmware versions and RF modes
//! - [`protocol`] - culfw line framing and command strings
//! - [`listener`] - Listener fan-out
//! - [`handler`] - The [`CulHandler`] contract and its transports
//! - [`registry`] - Handler factories keyed by device type
//! - [`init`] - The handshake run on every new handler
//! - [`manager`] - The [`CulManager`] session registry
//! - [`reconnect`] - Reconnection after transport loss

pub mod error;
pub mod handler;
pub mod init;
pub mod listener;
pub mod manager;
pub mod protocol;
pub mod reconnect;
pub mod registry;
pub mod types;

// Re-exports for convenience
pub use error::{Error, LineError, Result};
pub use handler::{
    CulHandler, NetworkConfig, NetworkHandler, SerialConfig, SerialHandler, serial::list_ports,
};
pub use listener::{Event, Listener, ListenerId, Listeners, Subscription};
pub use manager::CulManager;
pub use reconnect::{ReconnectPolicy, Supervisor, reconnect, reopen};
pub use registry::{HandlerFactory, HandlerRegistry};
pub use types::{DeviceName, FirmwareVersion, Mode};
