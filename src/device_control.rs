//! OS-level control over attached USB modems.
//!
//! Used by quarantine to take a modem off the bus. Both actions shell out to
//! system tooling; removal has no verified postcondition.

use std::path::Path;

use crate::error_handling::types::DeviceControlError;

pub mod udev;

pub use udev::{usb_bus_id, UdevDeviceControl};

pub trait DeviceControl: Send + Sync {
    /// Resolves a device node such as `/dev/ttyUSB0` to its USB bus id
    /// (for example `1-1.2`).
    fn resolve_bus_path(&self, device_path: &Path) -> Result<String, DeviceControlError>;

    /// Asks the kernel to remove the USB device with the given bus id.
    fn remove_device(&self, bus_id: &str) -> Result<(), DeviceControlError>;
}
