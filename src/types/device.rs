//! Device identity types.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A device name of the form `type:address`.
///
/// The type selects a handler factory, the address is passed verbatim to it.
/// Only the first colon separates the two, so `network:cul.local:2323` has
/// type `network` and address `cul.local:2323`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceName {
    name: String,
    split: usize,
}

impl DeviceName {
    /// Parses a device name.
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        match name.find(':') {
            Some(split) if split > 0 => Ok(Self { name, split }),
            _ => Err(Error::InvalidDeviceName { name }),
        }
    }

    /// The device type prefix.
    #[must_use]
    pub fn device_type(&self) -> &str {
        &self.name[..self.split]
    }

    /// Everything after the first colon.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.name[self.split + 1..]
    }

    /// The full name as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl FromStr for DeviceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Firmware version reported in reply to the version query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersion(String);

impl FirmwareVersion {
    /// Marker that starts a version reply.
    pub const MARKER: char = 'V';

    /// Parses a received line, returning `None` unless it is a version reply.
    #[must_use]
    pub fn from_line(line: &str) -> Option<Self> {
        line.strip_prefix(Self::MARKER)
            .map(|rest| Self(rest.trim().to_owned()))
    }

    /// The version text without the marker, e.g. `1.67 CUL868`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
