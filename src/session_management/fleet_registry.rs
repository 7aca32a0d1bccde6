use std::collections::BTreeMap;

use log::{info, warn};

use super::session::ModemSession;
use super::FleetStatusEntry;
use crate::error_handling::types::SessionError;

/// The structure holding the live modem sessions of this process.
///
/// Populated once at startup from device discovery and only ever shrunk
/// afterwards (quarantine or shutdown). Ingestion and reconciliation receive
/// it by `&mut`, so a removal is never observed half done.
///
/// # Fields Overview
///
/// - `sessions`: live sessions keyed by device id
#[derive(Default)]
pub struct FleetRegistry {
    sessions: BTreeMap<String, ModemSession>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session. Rejects a second session for the same device id or
    /// for the same physical unit (IMEI).
    pub fn insert(&mut self, session: ModemSession) -> Result<(), SessionError> {
        let device_id = session.device_id().to_string();
        if self.sessions.contains_key(&device_id) {
            return Err(SessionError::AlreadyRegistered(device_id));
        }
        if let Some(imei) = session.imei() {
            if self.sessions.values().any(|s| s.imei() == Some(imei)) {
                return Err(SessionError::DuplicateDevice {
                    device_id,
                    imei: imei.to_string(),
                });
            }
        }
        self.sessions.insert(device_id, session);
        Ok(())
    }

    /// Closes the session's driver, then drops it from the registry.
    pub fn remove(&mut self, device_id: &str) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(device_id)
            .ok_or_else(|| SessionError::NotFound(device_id.to_string()))?;
        session.close();
        self.sessions.remove(device_id);
        info!("Removed session {} from the fleet", device_id);
        Ok(())
    }

    pub fn get_mut(&mut self, device_id: &str) -> Option<&mut ModemSession> {
        self.sessions.get_mut(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.sessions.contains_key(device_id)
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut ModemSession> {
        self.sessions.values_mut()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn status(&mut self) -> Vec<FleetStatusEntry> {
        self.sessions.values_mut().map(|s| s.status()).collect()
    }

    /// Closes every session and empties the registry.
    pub fn shutdown_all(&mut self) {
        for session in self.sessions.values_mut() {
            session.close();
        }
        if !self.sessions.is_empty() {
            warn!("Shutting down {} modem sessions", self.sessions.len());
        }
        self.sessions.clear();
    }
}
