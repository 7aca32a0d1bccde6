use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use log::{debug, info, warn};
use regex::Regex;

use super::DeviceControl;
use crate::error_handling::types::DeviceControlError;

static USB_INTERFACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+-[\d.]+:\d+\.\d+$").expect("valid interface regex"));
static USB_BUS_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+-\d+(\.\d+)*$").expect("valid bus id regex"));

/// Extracts the USB bus id from a sysfs device path.
///
/// The bus id is the component right before the first interface component
/// (`<bus id>:<config>.<interface>`).
pub fn usb_bus_id(sysfs_path: &str) -> Option<String> {
    let components: Vec<&str> = sysfs_path.split('/').filter(|c| !c.is_empty()).collect();
    let interface = components.iter().position(|c| USB_INTERFACE.is_match(c))?;
    let bus_id = components.get(interface.checked_sub(1)?)?;
    USB_BUS_ID.is_match(bus_id).then(|| bus_id.to_string())
}

/// [`DeviceControl`] backed by `udevadm` and the sysfs `remove` attribute.
#[derive(Debug, Default, Clone)]
pub struct UdevDeviceControl;

impl DeviceControl for UdevDeviceControl {
    fn resolve_bus_path(&self, device_path: &Path) -> Result<String, DeviceControlError> {
        let output = Command::new("udevadm")
            .args(["info", "-q", "path", "-n"])
            .arg(device_path)
            .output()?;
        if !output.status.success() {
            return Err(DeviceControlError::ResolveFailed(format!(
                "udevadm exited with {} for {}: {}",
                output.status,
                device_path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let sysfs_path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("{} lives at {}", device_path.display(), sysfs_path);
        usb_bus_id(&sysfs_path).ok_or(DeviceControlError::InvalidBusPath(sysfs_path))
    }

    fn remove_device(&self, bus_id: &str) -> Result<(), DeviceControlError> {
        // the id ends up in a shell command line
        if !USB_BUS_ID.is_match(bus_id) {
            return Err(DeviceControlError::InvalidBusPath(bus_id.to_string()));
        }
        let script = format!("echo 1 > /sys/bus/usb/devices/{}/remove", bus_id);
        let status = Command::new("sh").arg("-c").arg(&script).status()?;
        if status.success() {
            info!("Requested removal of USB device {}", bus_id);
        } else {
            warn!("Removal request for USB device {} exited with {}", bus_id, status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bus_id_before_interface() {
        let path = "/devices/pci0000:00/0000:00:14.0/usb1/1-1/1-1.2/1-1.2:1.0/ttyUSB0/tty/ttyUSB0";
        assert_eq!(usb_bus_id(path).as_deref(), Some("1-1.2"));
    }

    #[test]
    fn extracts_root_port_bus_id() {
        let path = "/devices/pci0000:00/0000:00:14.0/usb2/2-3/2-3:1.2/ttyUSB3/tty/ttyUSB3";
        assert_eq!(usb_bus_id(path).as_deref(), Some("2-3"));
    }

    #[test]
    fn rejects_paths_without_usb_interface() {
        assert_eq!(usb_bus_id("/devices/platform/serial8250/tty/ttyS0"), None);
        assert_eq!(usb_bus_id(""), None);
        assert_eq!(usb_bus_id("1-1.2:1.0/ttyUSB0"), None);
    }

    #[test]
    fn remove_refuses_unsafe_bus_ids() {
        let control = UdevDeviceControl;
        assert!(matches!(
            control.remove_device("1-1; rm -rf /"),
            Err(DeviceControlError::InvalidBusPath(_))
        ));
        assert!(matches!(
            control.remove_device("../1-1"),
            Err(DeviceControlError::InvalidBusPath(_))
        ));
    }
}
