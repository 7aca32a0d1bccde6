//! AT command set implementation of [`ModemDriver`].
//!
//! The modem is put in SMS text mode with extended registration reporting so
//! that every query maps onto a single command:
//!
//! | query                | command       |
//! |----------------------|---------------|
//! | IMSI                 | `AT+CIMI`     |
//! | IMEI                 | `AT+CGSN`     |
//! | operator             | `AT+COPS?`    |
//! | registration, cell   | `AT+CREG?`    |
//! | store usage          | `AT+CPMS?`    |
//! | read one slot        | `AT+CMGR=<n>` |
//! | delete one slot      | `AT+CMGD=<n>` |

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDateTime, Utc};
use log::{debug, warn};
use regex::Regex;
use serde::Serialize;

use super::driver::{
    Cursor, DeviceMessage, Location, ModemDriver, NetworkInfo, Page, RegistrationState,
    StoragePartition, StoreStatus,
};
use super::transport::{AtTransport, Connector};
use crate::error_handling::types::ModemError;

static CPMS_PARTITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)",\s*(\d+),\s*(\d+)"#).expect("valid regex"));

static CMGR_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\+CMGR:\s*"([^"]*)",\s*"([^"]*)"(?:\s*,[^,]*,\s*"([^"]*)")?"#)
        .expect("valid regex")
});

/// Setup commands sent once when a session is opened. Rejections of the
/// optional ones are tolerated.
const SETUP_COMMANDS: [(&str, bool); 4] = [
    ("ATE0", true),
    ("AT+CMGF=1", true),
    ("AT+CREG=2", false),
    ("AT+COPS=3,2", false),
];

/// Line settings and bookkeeping for one driver instance.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    /// Directory receiving a TOML profile per open device, if set.
    pub profile_dir: Option<PathBuf>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(1),
            profile_dir: None,
        }
    }
}

#[derive(Serialize)]
struct DriverProfile {
    port: String,
    baud_rate: u32,
    read_timeout_ms: u64,
    imei: Option<String>,
    opened_at: String,
}

pub struct AtModem {
    transport: Option<Box<dyn AtTransport>>,
    device_path: PathBuf,
    /// Slot count of the read storage, learned from `AT+CPMS?`.
    capacity: Option<u32>,
    profile_path: Option<PathBuf>,
}

impl AtModem {
    /// Connects to `device_path` and prepares the modem for text-mode reads.
    ///
    /// A device that stops answering during setup yields
    /// [`ModemError::Timeout`].
    pub fn open(
        device_path: &Path,
        connector: &dyn Connector,
        config: &DriverConfig,
    ) -> Result<Self, ModemError> {
        let transport = connector.connect(device_path)?;
        let mut modem = Self::initialize(transport, device_path)?;

        if let Some(dir) = &config.profile_dir {
            let imei = modem.equipment_identity().ok();
            match modem.write_profile(dir, config, imei) {
                Ok(path) => modem.profile_path = Some(path),
                Err(e) => warn!(
                    "Unable to write driver profile for {}: {}",
                    device_path.display(),
                    e
                ),
            }
        }

        Ok(modem)
    }

    /// Runs the setup sequence on an already connected transport.
    pub fn initialize(
        transport: Box<dyn AtTransport>,
        device_path: &Path,
    ) -> Result<Self, ModemError> {
        let mut modem = Self {
            transport: Some(transport),
            device_path: device_path.to_path_buf(),
            capacity: None,
            profile_path: None,
        };

        for (command, required) in SETUP_COMMANDS {
            match modem.command(command) {
                Ok(_) => {}
                Err(ModemError::Rejected { reason, .. }) if !required => {
                    debug!(
                        "{} rejected {} ({}), continuing",
                        device_path.display(),
                        command,
                        reason
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(modem)
    }

    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    fn command(&mut self, command: &str) -> Result<Vec<String>, ModemError> {
        self.transport
            .as_mut()
            .ok_or(ModemError::Closed)?
            .send(command)
    }

    fn write_profile(
        &self,
        dir: &Path,
        config: &DriverConfig,
        imei: Option<String>,
    ) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let name = self
            .device_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "modem".to_string());
        let path = dir.join(format!("{}.toml", name));

        let profile = DriverProfile {
            port: self.device_path.display().to_string(),
            baud_rate: config.baud_rate,
            read_timeout_ms: config.read_timeout.as_millis() as u64,
            imei,
            opened_at: Utc::now().to_rfc3339(),
        };
        let body = toml::to_string(&profile)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&path, body)?;
        Ok(path)
    }

    fn read_slot(&mut self, location: Location) -> Result<Option<DeviceMessage>, ModemError> {
        match self.command(&format!("AT+CMGR={}", location)) {
            Ok(lines) => parse_cmgr(location, &lines),
            // Empty or invalid index
            Err(ModemError::Rejected { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl ModemDriver for AtModem {
    fn identity(&mut self) -> Result<String, ModemError> {
        let lines = self.command("AT+CIMI")?;
        parse_numeric(&lines, "+CIMI:")
    }

    fn equipment_identity(&mut self) -> Result<String, ModemError> {
        let lines = self.command("AT+CGSN")?;
        parse_numeric(&lines, "+CGSN:")
    }

    fn network_info(&mut self) -> Result<NetworkInfo, ModemError> {
        let operator_code = match self.command("AT+COPS?") {
            Ok(lines) => parse_cops(&lines),
            Err(ModemError::Rejected { .. }) => None,
            Err(e) => return Err(e),
        };
        let lines = self.command("AT+CREG?")?;
        let (registration, cell_id) = parse_creg(&lines)?;

        Ok(NetworkInfo {
            operator_code,
            cell_id,
            registration,
        })
    }

    fn message_store_status(&mut self) -> Result<StoreStatus, ModemError> {
        let lines = self.command("AT+CPMS?")?;
        let status = parse_cpms(&lines)?;
        self.capacity = status.partitions.first().map(|p| p.total);
        Ok(status)
    }

    fn next_message(&mut self, cursor: Cursor) -> Result<Page, ModemError> {
        let capacity = match self.capacity {
            Some(c) => c,
            None => {
                self.message_store_status()?;
                self.capacity.unwrap_or(0)
            }
        };
        let first = match cursor {
            Cursor::Start => 0,
            Cursor::After(location) => location + 1,
        };

        for location in first..=capacity {
            if let Some(message) = self.read_slot(location)? {
                return Ok(Page::Messages {
                    messages: vec![message],
                    cursor: Cursor::After(location),
                });
            }
        }
        Ok(Page::EndOfStore)
    }

    fn delete_message(&mut self, location: Location) -> Result<(), ModemError> {
        self.command(&format!("AT+CMGD={}", location)).map(|_| ())
    }

    fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!("Closed modem {}", self.device_path.display());
        }
        if let Some(path) = self.profile_path.take() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove driver profile {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for AtModem {
    fn drop(&mut self) {
        self.close();
    }
}

fn find_line<'a>(lines: &'a [String], prefix: &str) -> Option<&'a str> {
    lines
        .iter()
        .find_map(|l| l.strip_prefix(prefix).map(|rest| rest.trim()))
}

/// Parses a bare numeric identity (`AT+CIMI`, `AT+CGSN`), tolerating modems
/// that prefix the value with the command name.
pub(crate) fn parse_numeric(lines: &[String], prefix: &str) -> Result<String, ModemError> {
    let value = lines
        .iter()
        .map(|l| l.strip_prefix(prefix).unwrap_or(l).trim().trim_matches('"'))
        .find(|v| !v.is_empty())
        .ok_or_else(|| ModemError::Protocol(format!("empty {} response", prefix)))?;

    if value.chars().all(|c| c.is_ascii_digit()) {
        Ok(value.to_string())
    } else {
        Err(ModemError::Protocol(format!("non numeric identity {:?}", value)))
    }
}

fn split_fields(rest: &str) -> Vec<String> {
    rest.split(',')
        .map(|f| f.trim().trim_matches('"').to_string())
        .collect()
}

/// `+COPS: <mode>[,<format>,<oper>[,<act>]]`
pub(crate) fn parse_cops(lines: &[String]) -> Option<String> {
    let fields = split_fields(find_line(lines, "+COPS:")?);
    fields.get(2).filter(|o| !o.is_empty()).cloned()
}

/// `+CREG: <n>,<stat>[,<lac>,<ci>[,<act>]]`
pub(crate) fn parse_creg(
    lines: &[String],
) -> Result<(RegistrationState, Option<String>), ModemError> {
    let rest = find_line(lines, "+CREG:")
        .ok_or_else(|| ModemError::Protocol("missing +CREG line".into()))?;
    let fields = split_fields(rest);
    let stat = fields
        .get(1)
        .and_then(|s| s.parse::<u8>().ok())
        .ok_or_else(|| ModemError::Protocol(format!("bad +CREG line {:?}", rest)))?;
    let cell_id = fields.get(3).filter(|c| !c.is_empty()).cloned();
    Ok((RegistrationState::from_code(stat), cell_id))
}

/// `+CPMS: "SM",3,30,"SM",3,30,"SM",3,30`. A storage listed for several
/// roles is counted once.
pub(crate) fn parse_cpms(lines: &[String]) -> Result<StoreStatus, ModemError> {
    let rest = find_line(lines, "+CPMS:")
        .ok_or_else(|| ModemError::Protocol("missing +CPMS line".into()))?;

    let mut status = StoreStatus::default();
    for caps in CPMS_PARTITION.captures_iter(rest) {
        let name = caps[1].to_string();
        if status.partitions.iter().any(|p| p.name == name) {
            continue;
        }
        let used = caps[2]
            .parse()
            .map_err(|_| ModemError::Protocol(format!("bad +CPMS count in {:?}", rest)))?;
        let total = caps[3]
            .parse()
            .map_err(|_| ModemError::Protocol(format!("bad +CPMS count in {:?}", rest)))?;
        status.partitions.push(StoragePartition { name, used, total });
    }

    if status.partitions.is_empty() {
        return Err(ModemError::Protocol(format!("bad +CPMS line {:?}", rest)));
    }
    Ok(status)
}

/// Text-mode `+CMGR` response. Returns `None` for an empty slot or a stored
/// outgoing message.
pub(crate) fn parse_cmgr(
    location: Location,
    lines: &[String],
) -> Result<Option<DeviceMessage>, ModemError> {
    let Some(header_idx) = lines.iter().position(|l| l.starts_with("+CMGR:")) else {
        return Ok(None);
    };
    let header = &lines[header_idx];
    let caps = CMGR_HEADER
        .captures(header)
        .ok_or_else(|| ModemError::Protocol(format!("bad +CMGR header {:?}", header)))?;

    if !caps[1].starts_with("REC") {
        return Ok(None);
    }
    let sender = caps[2].to_string();
    let timestamp = caps
        .get(3)
        .ok_or_else(|| ModemError::Protocol(format!("no timestamp in {:?}", header)))
        .and_then(|m| parse_timestamp(m.as_str()))?;
    let content = lines[header_idx + 1..].join("\n");

    Ok(Some(DeviceMessage {
        location,
        timestamp,
        sender,
        content,
    }))
}

/// `yy/MM/dd,hh:mm:ss±zz` where the zone is given in quarters of an hour.
pub(crate) fn parse_timestamp(raw: &str) -> Result<i64, ModemError> {
    let bad = || ModemError::Protocol(format!("bad timestamp {:?}", raw));

    let (datetime, zone) = match (raw.get(..17), raw.get(17..)) {
        (Some(d), Some(z)) => (d, z),
        _ => (raw, ""),
    };
    let naive = NaiveDateTime::parse_from_str(datetime, "%y/%m/%d,%H:%M:%S").map_err(|_| bad())?;
    let quarters: i32 = if zone.is_empty() {
        0
    } else {
        zone.parse().map_err(|_| bad())?
    };
    let offset = FixedOffset::east_opt(quarters * 15 * 60).ok_or_else(bad)?;

    naive
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.timestamp())
        .ok_or_else(bad)
}
