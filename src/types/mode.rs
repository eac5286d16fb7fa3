//! RF mode profiles.

use std::fmt;

use crate::protocol::command;

/// An RF configuration a device operates in.
///
/// A mode is a name plus the ordered setup commands sent after the version
/// query when a device is first opened. Two modes are equal when both the name
/// and the command list match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mode {
    name: String,
    commands: Vec<String>,
}

impl Mode {
    /// Creates a mode with the given setup commands.
    pub fn new<I, S>(name: impl Into<String>, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// 868 MHz SlowRF reporting (FS20, FHT, EM, HMS, ...).
    #[must_use]
    pub fn slow_rf() -> Self {
        Self::new("slow_rf", [command::SLOW_RF_REPORTING])
    }

    /// SlowRF reporting plus AskSin (`HomeMatic`) receive.
    #[must_use]
    pub fn asksin() -> Self {
        Self::new(
            "asksin",
            [command::SLOW_RF_REPORTING, command::ASKSIN_RECEIVE],
        )
    }

    /// SlowRF reporting plus MAX! receive.
    #[must_use]
    pub fn max() -> Self {
        Self::new("max", [command::SLOW_RF_REPORTING, command::MAX_RECEIVE])
    }

    /// The mode name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Setup commands in the order they are sent.
    #[must_use]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
