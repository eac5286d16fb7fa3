//! culfw command strings used by the session layer.
//!
//! Commands are ASCII lines sent to the device. Only the handshake, the
//! reset sent on release, and the receive switches used by the built-in modes
//! are defined here; everything else is opaque to this crate.

/// Requests the firmware version. The device answers with `V <version>`.
pub const VERSION_QUERY: &str = "V";

/// Switches reporting off and returns the radio to its default mode.
pub const RESET: &str = "X00";

/// Enables SlowRF message reporting with signal strength.
pub const SLOW_RF_REPORTING: &str = "X21";

/// Enables AskSin (`HomeMatic`) receive.
pub const ASKSIN_RECEIVE: &str = "Ar";

/// Enables MAX! receive.
pub const MAX_RECEIVE: &str = "Zr";
