//! Handler factory registry.
//!
//! Maps a device type prefix (`serial`, `network`, ...) to a function that
//! builds a closed handler for an address and mode. Registration for a type
//! that already has a factory replaces it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Result;
use crate::handler::{CulHandler, NetworkHandler, SerialHandler};
use crate::types::Mode;

/// Builds a closed handler for `(address, mode)`.
pub type HandlerFactory =
    Arc<dyn Fn(&str, &Mode) -> Result<Arc<dyn CulHandler>> + Send + Sync>;

/// Device type used for serially attached sticks.
pub const SERIAL: &str = "serial";

/// Device type used for TCP attached devices.
pub const NETWORK: &str = "network";

/// Registry of handler factories keyed by device type.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: RwLock<HashMap<String, HandlerFactory>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in `serial` and `network` factories.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(SERIAL, SerialHandler::factory());
        registry.register(NETWORK, NetworkHandler::factory());
        registry
    }

    /// Associates `device_type` with `factory`, replacing any earlier one.
    pub fn register(&self, device_type: impl Into<String>, factory: HandlerFactory) {
        let device_type = device_type.into();
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if factories.insert(device_type.clone(), factory).is_some() {
            tracing::warn!("replacing handler factory for device type {}", device_type);
        } else {
            tracing::debug!("registered handler factory for device type {}", device_type);
        }
    }

    /// Returns the factory registered for `device_type`.
    #[must_use]
    pub fn lookup(&self, device_type: &str) -> Option<HandlerFactory> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_type)
            .cloned()
    }

    /// Returns the registered device types, sorted.
    #[must_use]
    pub fn device_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("device_types", &self.device_types())
            .finish()
    }
}
