use super::types::LogLevel;
use crate::error_handling::types::ConfigError;
use crate::modem::{DriverConfig, SerialConnector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration structure that defines all runtime parameters.
///
/// This structure holds the complete configuration of the gateway: where the
/// database and logs live, which devices to ingest from, how to talk to them
/// and how ingestion and reconciliation behave. It is read from a TOML file;
/// every field has a default so a file only needs to list what it changes.
///
/// # Examples
///
/// ```
/// use smsgate::configuration::Config;
///
/// let config = Config::from_toml_str("quarantine_mode = true").unwrap();
/// assert!(config.quarantine_mode);
/// assert_eq!(config.web_bind_address, "127.0.0.1:8080");
/// ```
///
/// # Fields Overview
///
/// The configuration contains the following attributes:
/// - `db_path`: SQLite database file holding messages and numbers
/// - `log_path`: file receiving the log output, stderr when unset
/// - `log_level`: default log level, `RUST_LOG` takes precedence
/// - `delete_messages_after_ingest`: delete a message from the device once stored
/// - `quarantine_mode`: take a modem off the bus when its SIM changes cell
/// - `device_exclude_list`: device names never probed, e.g. `ttyUSB3`
/// - `temp_config_dir`: directory for per-device driver profiles
/// - `web_bind_address`: address of the HTTP interface
/// - `lock_path`: advisory lock file serializing ingestion runs
/// - `device_dir`: directory scanned for modems
/// - `poll_interval_secs`: period of the ingest and reconcile timer
/// - `baud_rate`, `read_timeout_ms`: serial line settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file.
    ///
    /// Parent directories are created when the database is first opened.
    pub db_path: PathBuf,

    /// Log file, opened in append mode.
    ///
    /// When unset the log goes to stderr.
    pub log_path: Option<PathBuf>,

    /// Default log level
    pub log_level: LogLevel,

    /// Delete each message from the device storage after it was stored.
    ///
    /// A message that was already stored (duplicate) is left on the device.
    /// A failed deletion never undoes the store write.
    pub delete_messages_after_ingest: bool,

    /// Quarantine ("paranoid") mode.
    ///
    /// When enabled, a modem whose SIM is observed in a different cell than
    /// the one recorded for it is removed from the USB bus and dropped from
    /// the fleet until the next restart.
    pub quarantine_mode: bool,

    /// Device names skipped during discovery
    pub device_exclude_list: Vec<String>,

    /// Directory receiving a driver profile per open device.
    ///
    /// Created on startup if missing.
    pub temp_config_dir: PathBuf,

    /// Address the web interface listens on, as `ip:port`
    pub web_bind_address: String,

    /// Advisory lock file.
    ///
    /// Every process ingesting from the same modems must use the same path.
    pub lock_path: PathBuf,

    /// Directory scanned for `ttyUSB*` and `ttyACM*` devices
    pub device_dir: PathBuf,

    /// Seconds between two ingest and reconcile passes of `serve`.
    ///
    /// Setting this to '0' disables the timer; passes then only run on request
    pub poll_interval_secs: u64,

    /// Serial line speed
    pub baud_rate: u32,

    /// Time a modem has to answer one command, in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/var/db/sms.db"),
            log_path: None,
            log_level: LogLevel::Info,
            delete_messages_after_ingest: false,
            quarantine_mode: false,
            device_exclude_list: Vec::new(),
            temp_config_dir: PathBuf::from("/var/tmp/smsgate"),
            web_bind_address: String::from("127.0.0.1:8080"),
            lock_path: PathBuf::from("/tmp/smsgate.lock"),
            device_dir: PathBuf::from("/dev"),
            poll_interval_secs: 60,
            baud_rate: 115_200,
            read_timeout_ms: 1_000,
        }
    }
}

impl Config {
    /// Upper bound of `read_timeout_ms`
    pub const MAX_READ_TIMEOUT_MS: u64 = 60_000;

    /// Reads and validates the configuration file at `path`.
    ///
    /// # Errors
    /// Returns `ConfigError::IoError` if the file cannot be read,
    /// `ConfigError::TomlError` if it is not valid TOML for this structure,
    /// or any error of [`Config::validate`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that cannot be checked by deserialization alone.
    ///
    /// The device directory must exist; the database, temp and lock
    /// locations are created on demand.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_address()?;

        if self.baud_rate == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "baud_rate must be greater than 0",
            )));
        }
        if self.read_timeout_ms == 0 || self.read_timeout_ms > Self::MAX_READ_TIMEOUT_MS {
            return Err(ConfigError::NotInRange(format!(
                "read_timeout_ms must be within 1..={}, got {}",
                Self::MAX_READ_TIMEOUT_MS,
                self.read_timeout_ms
            )));
        }
        if !self.device_dir.is_dir() {
            return Err(ConfigError::DirectoryDoesNotExist(
                self.device_dir.display().to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        self.web_bind_address
            .parse()
            .map_err(|_| ConfigError::BadIPFormatting(self.web_bind_address.clone()))
    }

    pub fn exclude_set(&self) -> HashSet<String> {
        self.device_exclude_list.iter().cloned().collect()
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// `None` when the timer is disabled
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            baud_rate: self.baud_rate,
            read_timeout: self.read_timeout(),
            profile_dir: Some(self.temp_config_dir.clone()),
        }
    }

    pub fn serial_connector(&self) -> SerialConnector {
        SerialConnector {
            baud_rate: self.baud_rate,
            read_timeout: self.read_timeout(),
        }
    }
}
