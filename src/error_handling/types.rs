use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadIPFormatting(String),
    DirectoryDoesNotExist(String),
    NotInRange(String),
    LoggingFailed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadIPFormatting(e) => write!(f, "IP formatting error: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::LoggingFailed(e) => write!(f, "Logging setup failed: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures talking to a single modem.
///
/// Only [`ModemError::Timeout`] (and IO timeouts) mean "the device stopped
/// answering"; callers skip the device for the current pass in that case.
#[derive(Debug)]
pub enum ModemError {
    /// No final result code arrived within the read timeout.
    Timeout(String),
    IoError(std::io::Error),
    SerialError(String),
    /// The device answered with `ERROR`, `+CMS ERROR` or `+CME ERROR`.
    Rejected { command: String, reason: String },
    /// The device answered but the payload could not be understood.
    Protocol(String),
    Closed,
}

impl ModemError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ModemError::Timeout(_) => true,
            ModemError::IoError(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModemError::Timeout(cmd) => write!(f, "Device timed out on {}", cmd),
            ModemError::IoError(e) => write!(f, "Device IO error: {}", e),
            ModemError::SerialError(e) => write!(f, "Serial port error: {}", e),
            ModemError::Rejected { command, reason } => {
                write!(f, "Device rejected {}: {}", command, reason)
            }
            ModemError::Protocol(e) => write!(f, "Unexpected device response: {}", e),
            ModemError::Closed => write!(f, "Session is closed"),
        }
    }
}

impl std::error::Error for ModemError {}

impl From<std::io::Error> for ModemError {
    fn from(err: std::io::Error) -> Self {
        ModemError::IoError(err)
    }
}

impl From<serialport::Error> for ModemError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::Io(std::io::ErrorKind::TimedOut) => {
                ModemError::Timeout(err.description)
            }
            _ => ModemError::SerialError(err.description),
        }
    }
}

#[derive(Debug)]
pub enum DiscoveryError {
    DeviceDirUnreadable(String, std::io::Error),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::DeviceDirUnreadable(dir, e) => {
                write!(f, "Unable to read device directory {}: {}", dir, e)
            }
        }
    }
}

impl std::error::Error for DiscoveryError {}

#[derive(Debug)]
pub enum SessionError {
    AlreadyRegistered(String),
    DuplicateDevice { device_id: String, imei: String },
    NotFound(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyRegistered(id) => write!(f, "Session {} already registered", id),
            SessionError::DuplicateDevice { device_id, imei } => write!(
                f,
                "Session {} is bound to device {} which is already registered",
                device_id, imei
            ),
            SessionError::NotFound(id) => write!(f, "Session {} not found", id),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed,
    WriteFailed,
    ReadFailed,
    /// The message is already present in the store.
    DuplicateMessage,
    AlreadyExists(String),
    NotFound(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed => write!(f, "Storage connection failed"),
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
            StorageError::DuplicateMessage => write!(f, "Message already stored"),
            StorageError::AlreadyExists(key) => write!(f, "Entry {} already exists", key),
            StorageError::NotFound(key) => write!(f, "Entry {} not found", key),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum CoordinatorError {
    /// Another ingestion run holds the lock.
    LockContention,
    IoError(std::io::Error),
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorError::LockContention => write!(f, "A run is already in progress"),
            CoordinatorError::IoError(e) => write!(f, "Run lock IO error: {}", e),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl From<std::io::Error> for CoordinatorError {
    fn from(err: std::io::Error) -> Self {
        CoordinatorError::IoError(err)
    }
}

/// Reasons a single session is skipped during reconciliation.
#[derive(Debug)]
pub enum MonitorError {
    ModemError(ModemError),
    StorageError(StorageError),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::ModemError(e) => write!(f, "Modem error: {}", e),
            MonitorError::StorageError(e) => write!(f, "Number registry error: {}", e),
        }
    }
}

impl std::error::Error for MonitorError {}

impl From<ModemError> for MonitorError {
    fn from(err: ModemError) -> Self {
        MonitorError::ModemError(err)
    }
}

impl From<StorageError> for MonitorError {
    fn from(err: StorageError) -> Self {
        MonitorError::StorageError(err)
    }
}

#[derive(Debug)]
pub enum DeviceControlError {
    ResolveFailed(String),
    InvalidBusPath(String),
    CommandFailed(std::io::Error),
}

impl fmt::Display for DeviceControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceControlError::ResolveFailed(e) => write!(f, "Bus path resolution failed: {}", e),
            DeviceControlError::InvalidBusPath(e) => write!(f, "Invalid bus path: {}", e),
            DeviceControlError::CommandFailed(e) => write!(f, "Device control command failed: {}", e),
        }
    }
}

impl std::error::Error for DeviceControlError {}

impl From<std::io::Error> for DeviceControlError {
    fn from(err: std::io::Error) -> Self {
        DeviceControlError::CommandFailed(err)
    }
}

#[derive(Debug)]
pub enum WebError {
    BadBindAddress(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BadBindAddress(e) => write!(f, "Bad web bind address: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    DiscoveryError(DiscoveryError),
    StorageError(StorageError),
    CoordinatorError(CoordinatorError),
    WebError(WebError),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::DiscoveryError(e) => write!(f, "Discovery error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::CoordinatorError(e) => write!(f, "Coordinator error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<DiscoveryError> for ControllerError {
    fn from(err: DiscoveryError) -> Self {
        ControllerError::DiscoveryError(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}

impl From<CoordinatorError> for ControllerError {
    fn from(err: CoordinatorError) -> Self {
        ControllerError::CoordinatorError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::WebError(err)
    }
}
