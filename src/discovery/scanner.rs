use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use crate::error_handling::types::{DiscoveryError, ModemError};
use crate::modem::at_driver::parse_numeric;
use crate::modem::Connector;

/// Device name prefixes treated as serial-class modem candidates.
const SERIAL_PREFIXES: [&str; 2] = ["ttyUSB", "ttyACM"];

/// A device that answered the liveness and identity probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    /// Device file name, e.g. `ttyUSB0`.
    pub device_id: String,
    pub path: PathBuf,
    pub imei: String,
}

/// Lists candidate device names under `device_dir`, minus the excluded ones.
pub fn candidates(
    device_dir: &Path,
    exclude: &HashSet<String>,
) -> Result<BTreeSet<String>, DiscoveryError> {
    let entries = fs::read_dir(device_dir).map_err(|e| {
        DiscoveryError::DeviceDirUnreadable(device_dir.display().to_string(), e)
    })?;

    let mut names = BTreeSet::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !SERIAL_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        if exclude.contains(&name) {
            debug!("Skipping excluded device {}", name);
            continue;
        }
        names.insert(name);
    }
    Ok(names)
}

fn probe(path: &Path, connector: &dyn Connector) -> Result<String, ModemError> {
    let mut transport = connector.connect(path)?;
    transport.send("AT")?;
    let lines = transport.send("AT+CGSN")?;
    parse_numeric(&lines, "+CGSN:")
}

/// Probes every candidate and returns the devices that answered.
///
/// Devices that fail to open, time out or report no IMEI are skipped; only
/// an unreadable device directory fails the scan. The order of the result is
/// not part of the contract.
pub fn scan(
    device_dir: &Path,
    exclude: &HashSet<String>,
    connector: &dyn Connector,
) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
    let mut seen_imeis = HashSet::new();
    let mut devices = Vec::new();

    for name in candidates(device_dir, exclude)? {
        let path = device_dir.join(&name);
        let imei = match probe(&path, connector) {
            Ok(imei) => imei,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if !seen_imeis.insert(imei.clone()) {
            debug!("Skipping {}: second endpoint of {}", path.display(), imei);
            continue;
        }
        devices.push(DiscoveredDevice {
            device_id: name,
            path,
            imei,
        });
    }

    info!("Discovered {} modem(s) under {}", devices.len(), device_dir.display());
    Ok(devices)
}
