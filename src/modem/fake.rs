//! In-memory doubles for the driver layer, used by unit tests across the crate.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::driver::{
    Cursor, DeviceMessage, Location, ModemDriver, NetworkInfo, Page, RegistrationState,
    StoragePartition, StoreStatus,
};
use super::transport::{AtTransport, Connector};
use crate::error_handling::types::ModemError;

#[derive(Debug, Clone)]
pub enum Reply {
    Lines(Vec<String>),
    Reject(String),
    Timeout,
}

impl Reply {
    pub fn lines(lines: &[&str]) -> Self {
        Reply::Lines(lines.iter().map(|l| l.to_string()).collect())
    }
}

/// Answers commands from a fixed script; unknown commands get a bare `OK`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    replies: HashMap<String, Reply>,
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, command: &str, reply: Reply) -> Self {
        self.replies.insert(command.to_string(), reply);
        self
    }
}

impl AtTransport for ScriptedTransport {
    fn send(&mut self, command: &str) -> Result<Vec<String>, ModemError> {
        self.sent.lock().unwrap().push(command.to_string());
        match self.replies.get(command) {
            Some(Reply::Lines(lines)) => Ok(lines.clone()),
            Some(Reply::Reject(reason)) => Err(ModemError::Rejected {
                command: command.to_string(),
                reason: reason.clone(),
            }),
            Some(Reply::Timeout) => Err(ModemError::Timeout(command.to_string())),
            None => Ok(Vec::new()),
        }
    }
}

/// Hands out clones of a scripted transport per device path.
#[derive(Default)]
pub struct FakeConnector {
    devices: HashMap<PathBuf, ScriptedTransport>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, path: &str, transport: ScriptedTransport) -> Self {
        self.devices.insert(PathBuf::from(path), transport);
        self
    }
}

impl Connector for FakeConnector {
    fn connect(&self, device_path: &Path) -> Result<Box<dyn AtTransport>, ModemError> {
        match self.devices.get(device_path) {
            Some(t) => Ok(Box::new(t.clone())),
            None => Err(ModemError::SerialError(format!(
                "No such device {}",
                device_path.display()
            ))),
        }
    }
}

/// Observable state behind a [`FakeModem`].
#[derive(Debug, Clone)]
pub struct FakeModemState {
    pub imsi: String,
    pub imei: String,
    pub operator_code: Option<String>,
    pub cell_id: Option<String>,
    pub messages: BTreeMap<Location, DeviceMessage>,
    pub page_size: usize,
    /// Number of pages served before every further read times out.
    pub timeout_after_pages: Option<usize>,
    pub identity_times_out: bool,
    pub network_times_out: bool,
    pub delete_fails: bool,
    pub pages_served: usize,
    pub deleted: Vec<Location>,
    pub closed: bool,
}

impl FakeModemState {
    pub fn new(imsi: &str) -> Self {
        Self {
            imsi: imsi.to_string(),
            imei: format!("35{}", &imsi[imsi.len().saturating_sub(13)..]),
            operator_code: Some("26201".into()),
            cell_id: Some("100".into()),
            messages: BTreeMap::new(),
            page_size: 1,
            timeout_after_pages: None,
            identity_times_out: false,
            network_times_out: false,
            delete_fails: false,
            pages_served: 0,
            deleted: Vec::new(),
            closed: false,
        }
    }

    pub fn with_messages(mut self, count: u32) -> Self {
        for location in 1..=count {
            self.messages.insert(
                location,
                DeviceMessage {
                    location,
                    timestamp: 1_700_000_000 + location as i64,
                    sender: format!("+4917{:08}", location),
                    content: format!("message {} for {}", location, self.imsi),
                },
            );
        }
        self
    }
}

/// Driver double whose state stays inspectable after the session took it.
#[derive(Clone)]
pub struct FakeModem {
    pub state: Arc<Mutex<FakeModemState>>,
}

impl FakeModem {
    pub fn new(state: FakeModemState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

impl ModemDriver for FakeModem {
    fn identity(&mut self) -> Result<String, ModemError> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(ModemError::Closed);
        }
        if state.identity_times_out {
            return Err(ModemError::Timeout("AT+CIMI".into()));
        }
        Ok(state.imsi.clone())
    }

    fn equipment_identity(&mut self) -> Result<String, ModemError> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(ModemError::Closed);
        }
        Ok(state.imei.clone())
    }

    fn network_info(&mut self) -> Result<NetworkInfo, ModemError> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(ModemError::Closed);
        }
        if state.network_times_out {
            return Err(ModemError::Timeout("AT+CREG?".into()));
        }
        Ok(NetworkInfo {
            operator_code: state.operator_code.clone(),
            cell_id: state.cell_id.clone(),
            registration: RegistrationState::Home,
        })
    }

    fn message_store_status(&mut self) -> Result<StoreStatus, ModemError> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(ModemError::Closed);
        }
        Ok(StoreStatus {
            partitions: vec![StoragePartition {
                name: "SM".into(),
                used: state.messages.len() as u32,
                total: 50,
            }],
        })
    }

    fn next_message(&mut self, cursor: Cursor) -> Result<Page, ModemError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(ModemError::Closed);
        }
        if let Some(limit) = state.timeout_after_pages {
            if state.pages_served >= limit {
                return Err(ModemError::Timeout("AT+CMGR".into()));
            }
        }
        let from = match cursor {
            Cursor::Start => 0,
            Cursor::After(location) => location + 1,
        };
        let messages: Vec<DeviceMessage> = state
            .messages
            .range(from..)
            .take(state.page_size)
            .map(|(_, m)| m.clone())
            .collect();
        let Some(last) = messages.last().map(|m| m.location) else {
            return Ok(Page::EndOfStore);
        };
        state.pages_served += 1;
        Ok(Page::Messages {
            messages,
            cursor: Cursor::After(last),
        })
    }

    fn delete_message(&mut self, location: Location) -> Result<(), ModemError> {
        let mut state = self.state.lock().unwrap();
        if state.delete_fails {
            return Err(ModemError::Rejected {
                command: format!("AT+CMGD={}", location),
                reason: "ERROR".into(),
            });
        }
        state.messages.remove(&location);
        state.deleted.push(location);
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}
