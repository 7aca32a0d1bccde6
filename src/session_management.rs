//! Session management core module.
//!
//! This module provides the types for the live modem fleet: one
//! [`session::ModemSession`] per attached device, collected in the
//! [`fleet_registry::FleetRegistry`] for the lifetime of the process.

use serde::{Deserialize, Serialize};

use crate::modem::RegistrationState;

/// Submodule for the fleet registry.
pub mod fleet_registry;
/// Submodule for a single modem session.
pub mod session;

pub use fleet_registry::FleetRegistry;
pub use session::ModemSession;

/// Represents the current status of a session.
///
/// Variants:
/// - `Active`: The device answered the last query.
/// - `Unresponsive`: The device timed out or failed the last query.
/// - `Closed`: The driver handle has been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Unresponsive,
    Closed,
}

/// Snapshot of one session, as reported by the fleet status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FleetStatusEntry {
    pub device_id: String,
    pub imei: Option<String>,
    pub imsi: Option<String>,
    pub operator_code: Option<String>,
    pub cell_id: Option<String>,
    pub registration: Option<RegistrationState>,
    pub pending_messages: Option<u32>,
    pub status: SessionStatus,
    pub error: Option<String>,
}
