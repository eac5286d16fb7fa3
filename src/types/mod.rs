//! Data types shared across the library:
//! - Device names and firmware versions
//! - RF modes

pub mod device;
pub mod mode;

pub use device::{DeviceName, FirmwareVersion};
pub use mode::Mode;
