//! Capability interface implemented once per modem transport.

use serde::Serialize;

use crate::error_handling::types::ModemError;

/// Device-assigned storage slot of a message.
pub type Location = u32;

/// Position in the device message store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Before the first message.
    Start,
    /// Right after the message stored at the given location.
    After(Location),
}

/// One page returned by [`ModemDriver::next_message`].
///
/// The page size is decided by the device; callers must not assume one
/// message per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Messages {
        messages: Vec<DeviceMessage>,
        cursor: Cursor,
    },
    EndOfStore,
}

/// A message as reported by the device, fields in raw device encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMessage {
    pub location: Location,
    /// Send time in epoch seconds.
    pub timestamp: i64,
    pub sender: String,
    pub content: String,
}

/// Network registration state as defined for `+CREG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationState {
    NotRegistered,
    Home,
    Searching,
    Denied,
    Unknown,
    Roaming,
}

impl RegistrationState {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => RegistrationState::NotRegistered,
            1 => RegistrationState::Home,
            2 => RegistrationState::Searching,
            3 => RegistrationState::Denied,
            5 => RegistrationState::Roaming,
            _ => RegistrationState::Unknown,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationState::Home | RegistrationState::Roaming)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    /// Numeric MCC+MNC, e.g. `26201`.
    pub operator_code: Option<String>,
    /// Serving cell id as reported by the device.
    pub cell_id: Option<String>,
    pub registration: RegistrationState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoragePartition {
    pub name: String,
    pub used: u32,
    pub total: u32,
}

/// Usage of every message storage partition on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub partitions: Vec<StoragePartition>,
}

impl StoreStatus {
    pub fn used_total(&self) -> u32 {
        self.partitions.iter().map(|p| p.used).sum()
    }
}

/// Narrow interface to one physical modem.
///
/// A driver is owned by exactly one session. `close` must be idempotent; any
/// call after `close` fails with [`ModemError::Closed`].
pub trait ModemDriver: Send {
    /// SIM identity (IMSI).
    fn identity(&mut self) -> Result<String, ModemError>;

    /// Equipment identity (IMEI).
    fn equipment_identity(&mut self) -> Result<String, ModemError>;

    fn network_info(&mut self) -> Result<NetworkInfo, ModemError>;

    fn message_store_status(&mut self) -> Result<StoreStatus, ModemError>;

    fn next_message(&mut self, cursor: Cursor) -> Result<Page, ModemError>;

    fn delete_message(&mut self, location: Location) -> Result<(), ModemError>;

    fn close(&mut self);
}
