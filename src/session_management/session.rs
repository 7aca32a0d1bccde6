use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};

use super::{FleetStatusEntry, SessionStatus};
use crate::discovery::DiscoveredDevice;
use crate::error_handling::types::ModemError;
use crate::modem::{
    blocking_io, AtModem, Connector, Cursor, DriverConfig, Location, ModemDriver, NetworkInfo,
    Page, StoreStatus,
};

/// One physical modem for the lifetime of the process.
///
/// The session owns its driver exclusively. The IMSI is queried once and
/// cached; network information is queried fresh on every call and the last
/// answer is kept for status reporting. Every driver call goes through
/// [`blocking_io`] so that a slow device does not hold up the runtime.
pub struct ModemSession {
    device_id: String,
    device_path: PathBuf,
    imei: Option<String>,
    driver: Box<dyn ModemDriver>,
    imsi: Option<String>,
    network_info: Option<NetworkInfo>,
    opened_at: DateTime<Utc>,
    closed: bool,
}

impl ModemSession {
    /// Opens the AT driver for a discovered device.
    ///
    /// A timeout here means the device is unusable for this run; the caller
    /// logs it and moves on to the next device.
    pub fn open(
        device: &DiscoveredDevice,
        connector: &dyn Connector,
        config: &DriverConfig,
    ) -> Result<Self, ModemError> {
        let driver = blocking_io(|| AtModem::open(&device.path, connector, config))?;
        info!("Opened session for {} ({})", device.device_id, device.imei);
        Ok(Self::from_driver(&device.device_id, &device.path, Box::new(driver))
            .with_imei(&device.imei))
    }

    pub fn from_driver(device_id: &str, device_path: &Path, driver: Box<dyn ModemDriver>) -> Self {
        Self {
            device_id: device_id.to_string(),
            device_path: device_path.to_path_buf(),
            imei: None,
            driver,
            imsi: None,
            network_info: None,
            opened_at: Utc::now(),
            closed: false,
        }
    }

    pub fn with_imei(mut self, imei: &str) -> Self {
        self.imei = Some(imei.to_string());
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    pub fn imei(&self) -> Option<&str> {
        self.imei.as_deref()
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), ModemError> {
        if self.closed {
            Err(ModemError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn identity(&mut self) -> Result<String, ModemError> {
        if let Some(imsi) = &self.imsi {
            return Ok(imsi.clone());
        }
        self.ensure_open()?;
        let imsi = blocking_io(|| self.driver.identity())?;
        debug!("{} reports IMSI {}", self.device_id, imsi);
        self.imsi = Some(imsi.clone());
        Ok(imsi)
    }

    pub fn network_info(&mut self) -> Result<NetworkInfo, ModemError> {
        self.ensure_open()?;
        let info = blocking_io(|| self.driver.network_info())?;
        self.network_info = Some(info.clone());
        Ok(info)
    }

    pub fn cached_network_info(&self) -> Option<&NetworkInfo> {
        self.network_info.as_ref()
    }

    pub fn message_store_status(&mut self) -> Result<StoreStatus, ModemError> {
        self.ensure_open()?;
        blocking_io(|| self.driver.message_store_status())
    }

    pub fn next_message(&mut self, cursor: Cursor) -> Result<Page, ModemError> {
        self.ensure_open()?;
        blocking_io(|| self.driver.next_message(cursor))
    }

    pub fn delete_message(&mut self, location: Location) -> Result<(), ModemError> {
        self.ensure_open()?;
        blocking_io(|| self.driver.delete_message(location))
    }

    /// Releases the driver handle. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.driver.close();
        self.closed = true;
        debug!("Closed session {}", self.device_id);
    }

    /// Queries the device for a fresh status snapshot.
    pub fn status(&mut self) -> FleetStatusEntry {
        let mut entry = FleetStatusEntry {
            device_id: self.device_id.clone(),
            imei: self.imei.clone(),
            imsi: self.imsi.clone(),
            operator_code: None,
            cell_id: None,
            registration: None,
            pending_messages: None,
            status: SessionStatus::Active,
            error: None,
        };
        if self.closed {
            entry.status = SessionStatus::Closed;
            return entry;
        }

        let snapshot = self.identity().and_then(|imsi| {
            let info = self.network_info()?;
            let store = self.message_store_status()?;
            Ok((imsi, info, store))
        });
        match snapshot {
            Ok((imsi, info, store)) => {
                entry.imsi = Some(imsi);
                entry.operator_code = info.operator_code;
                entry.cell_id = info.cell_id;
                entry.registration = Some(info.registration);
                entry.pending_messages = Some(store.used_total());
            }
            Err(e) => {
                entry.status = SessionStatus::Unresponsive;
                entry.error = Some(e.to_string());
            }
        }
        entry
    }
}

impl Drop for ModemSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::fake::{FakeConnector, FakeModem, FakeModemState, Reply, ScriptedTransport};

    fn session(state: FakeModemState) -> (ModemSession, FakeModem) {
        let fake = FakeModem::new(state);
        let session = ModemSession::from_driver(
            "ttyUSB0",
            Path::new("/dev/ttyUSB0"),
            Box::new(fake.clone()),
        );
        (session, fake)
    }

    #[test]
    fn identity_is_cached() {
        let (mut session, fake) = session(FakeModemState::new("262011234567890"));
        assert_eq!(session.identity().unwrap(), "262011234567890");

        fake.state.lock().unwrap().identity_times_out = true;
        assert_eq!(session.identity().unwrap(), "262011234567890");
    }

    #[test]
    fn network_info_is_fresh_on_every_call() {
        let (mut session, fake) = session(FakeModemState::new("262011234567890"));
        assert_eq!(session.network_info().unwrap().cell_id.as_deref(), Some("100"));

        fake.state.lock().unwrap().cell_id = Some("200".into());
        assert_eq!(session.network_info().unwrap().cell_id.as_deref(), Some("200"));
        assert_eq!(
            session.cached_network_info().and_then(|i| i.cell_id.as_deref()),
            Some("200")
        );
    }

    #[test]
    fn close_releases_driver_once() {
        let (mut session, fake) = session(FakeModemState::new("262011234567890"));
        session.close();
        session.close();
        assert!(session.is_closed());
        assert!(fake.state.lock().unwrap().closed);
        assert!(matches!(session.network_info(), Err(ModemError::Closed)));
    }

    #[test]
    fn status_reports_unresponsive_device() {
        let mut state = FakeModemState::new("262011234567890").with_messages(2);
        state.network_times_out = true;
        let (mut session, _fake) = session(state);

        let status = session.status();
        assert_eq!(status.status, SessionStatus::Unresponsive);
        assert!(status.error.is_some());
    }

    #[test]
    fn status_reports_pending_messages() {
        let (mut session, _fake) = session(FakeModemState::new("262011234567890").with_messages(3));
        let status = session.status();
        assert_eq!(status.status, SessionStatus::Active);
        assert_eq!(status.pending_messages, Some(3));
        assert_eq!(status.imsi.as_deref(), Some("262011234567890"));
    }

    #[test]
    fn open_uses_the_at_driver() {
        let transport = ScriptedTransport::new().reply("AT+CIMI", Reply::lines(&["262017654321098"]));
        let connector = FakeConnector::new().device("/dev/ttyUSB1", transport);
        let device = DiscoveredDevice {
            device_id: "ttyUSB1".into(),
            path: PathBuf::from("/dev/ttyUSB1"),
            imei: "356938035643809".into(),
        };

        let mut session = ModemSession::open(&device, &connector, &DriverConfig::default()).unwrap();
        assert_eq!(session.imei(), Some("356938035643809"));
        assert_eq!(session.identity().unwrap(), "262017654321098");
    }
}
