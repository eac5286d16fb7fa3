//! Error types for the cul library.

use thiserror::Error;

/// The main error type for CUL device operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No handler factory is registered for the device type prefix.
    #[error("no handler registered for device type {device_type}")]
    UnknownDeviceType { device_type: String },

    /// The device is already open in a different RF mode.
    #[error("device {device} is already open in mode {mode}")]
    DeviceConflict { device: String, mode: String },

    /// Building, opening or initializing a device failed.
    #[error("device error: {message}")]
    Device {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Sending to or receiving from a live device failed.
    #[error("communication error: {message}")]
    Communication { message: String },

    /// The device name is not of the form `type:address`.
    #[error("invalid device name {name:?}: expected type:address")]
    InvalidDeviceName { name: String },

    /// Line decoding error.
    #[error("line error: {0}")]
    Line(#[from] LineError),

    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation timed out.
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The handler is not open.
    #[error("not connected")]
    NotConnected,

    /// Reconnection gave up after the configured number of attempts.
    #[error("reconnection failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl Error {
    /// Creates a device error without an underlying cause.
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps `cause` in a device error.
    pub fn device_caused_by(message: impl Into<String>, cause: Self) -> Self {
        Self::Device {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Creates a communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }
}

/// Line-framing errors.
#[derive(Debug, Error)]
pub enum LineError {
    /// A received line exceeded the maximum line length.
    #[error("line too long: {size} bytes exceeds maximum {max}")]
    TooLong { size: usize, max: usize },
}

/// Result type alias for cul operations.
pub type Result<T> = std::result::Result<T, Error>;
