use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::device_control::DeviceControl;
use crate::error_handling::types::{MonitorError, StorageError};
use crate::session_management::{FleetRegistry, ModemSession};
use crate::storage::{NumberEntry, NumberRegistry};

/// A SIM observed in a different cell than the one recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CidChangeEvent {
    pub device_id: String,
    pub imsi: String,
    pub previous_cid: String,
    pub current_cid: String,
    /// Set when the modem was removed as a consequence of this change.
    pub quarantined: bool,
    pub observed_at: DateTime<Utc>,
}

pub struct CellMonitor {
    numbers: Arc<dyn NumberRegistry>,
    device_control: Arc<dyn DeviceControl>,
    quarantine_mode: bool,
}

impl CellMonitor {
    pub fn new(
        numbers: Arc<dyn NumberRegistry>,
        device_control: Arc<dyn DeviceControl>,
        quarantine_mode: bool,
    ) -> Self {
        Self {
            numbers,
            device_control,
            quarantine_mode,
        }
    }

    pub fn quarantine_mode(&self) -> bool {
        self.quarantine_mode
    }

    /// Compares every session's serving cell against the number registry.
    ///
    /// Unknown SIMs are registered with the observed cell. A session that
    /// fails to answer is skipped for this pass only.
    pub async fn reconcile(&self, fleet: &mut FleetRegistry) -> Vec<CidChangeEvent> {
        let mut events = Vec::new();
        for session in fleet.sessions_mut() {
            match self.check_session(session).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => warn!("Skipping cell check of {}: {}", session.device_id(), e),
            }
        }

        if self.quarantine_mode {
            for event in events.iter_mut() {
                event.quarantined = self.quarantine(fleet, &event.device_id);
            }
        }

        info!(
            "Reconciliation done: {} cell changes, {} sessions left",
            events.len(),
            fleet.len()
        );
        events
    }

    async fn check_session(
        &self,
        session: &mut ModemSession,
    ) -> Result<Option<CidChangeEvent>, MonitorError> {
        let imsi = session.identity()?;
        let info = session.network_info()?;

        let Some(mut entry) = self.numbers.get(&imsi).await? else {
            info!(
                "Registering new SIM {} seen in cell {}",
                imsi,
                info.cell_id.as_deref().unwrap_or("unknown")
            );
            return match self
                .numbers
                .create(&NumberEntry::first_seen(&imsi, info.cell_id))
                .await
            {
                Ok(()) | Err(StorageError::AlreadyExists(_)) => Ok(None),
                Err(e) => Err(e.into()),
            };
        };
        let Some(cid) = info.cell_id else {
            debug!("{} reports no cell id", session.device_id());
            return Ok(None);
        };

        if entry.cid.as_deref() == Some(cid.as_str()) {
            return Ok(None);
        }
        let previous = entry.cid.replace(cid.clone());
        self.numbers.update(&entry).await?;

        let Some(previous) = previous else {
            debug!("Recorded first cell {} for {}", cid, imsi);
            return Ok(None);
        };
        warn!(
            "SIM {} on {} moved from cell {} to cell {}",
            imsi,
            session.device_id(),
            previous,
            cid
        );
        Ok(Some(CidChangeEvent {
            device_id: session.device_id().to_string(),
            imsi,
            previous_cid: previous,
            current_cid: cid,
            quarantined: false,
            observed_at: Utc::now(),
        }))
    }

    /// Takes the modem off the bus and drops its session. The OS removal is
    /// fire-and-forget: its failure is logged and the session is dropped
    /// regardless.
    fn quarantine(&self, fleet: &mut FleetRegistry, device_id: &str) -> bool {
        let Some(device_path) = fleet
            .get_mut(device_id)
            .map(|s| s.device_path().to_path_buf())
        else {
            return false;
        };

        warn!("Quarantining {}", device_id);
        match self.device_control.resolve_bus_path(&device_path) {
            Ok(bus_id) => {
                if let Err(e) = self.device_control.remove_device(&bus_id) {
                    error!("Unable to remove USB device {} ({}): {}", bus_id, device_id, e);
                }
            }
            Err(e) => error!("Unable to resolve bus path of {}: {}", device_path.display(), e),
        }

        match fleet.remove(device_id) {
            Ok(()) => true,
            Err(e) => {
                warn!("Unable to drop session {}: {}", device_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::DeviceControlError;
    use crate::modem::fake::{FakeModem, FakeModemState};
    use crate::storage::DatabaseStorage;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingControl {
        resolved: Mutex<Vec<PathBuf>>,
        removed: Mutex<Vec<String>>,
        fail_resolve: bool,
    }

    impl DeviceControl for RecordingControl {
        fn resolve_bus_path(&self, device_path: &Path) -> Result<String, DeviceControlError> {
            self.resolved.lock().unwrap().push(device_path.to_path_buf());
            if self.fail_resolve {
                return Err(DeviceControlError::ResolveFailed("no udev".into()));
            }
            Ok("1-1.2".into())
        }

        fn remove_device(&self, bus_id: &str) -> Result<(), DeviceControlError> {
            self.removed.lock().unwrap().push(bus_id.to_string());
            Ok(())
        }
    }

    struct Setup {
        storage: Arc<DatabaseStorage>,
        control: Arc<RecordingControl>,
        fleet: FleetRegistry,
        fake: FakeModem,
        _dir: TempDir,
    }

    const IMSI: &str = "262010000000001";

    async fn setup(control: RecordingControl) -> Setup {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(
            DatabaseStorage::new_file(dir.path().join("sms.db"))
                .await
                .unwrap(),
        );
        let fake = FakeModem::new(FakeModemState::new(IMSI));
        let mut fleet = FleetRegistry::new();
        fleet
            .insert(ModemSession::from_driver(
                "ttyUSB0",
                Path::new("/dev/ttyUSB0"),
                Box::new(fake.clone()),
            ))
            .unwrap();
        Setup {
            storage,
            control: Arc::new(control),
            fleet,
            fake,
            _dir: dir,
        }
    }

    fn monitor(s: &Setup, quarantine_mode: bool) -> CellMonitor {
        CellMonitor::new(s.storage.clone(), s.control.clone(), quarantine_mode)
    }

    async fn register(s: &Setup, cid: Option<&str>) {
        s.storage
            .create(&NumberEntry {
                imsi: IMSI.into(),
                number: Some("+4915100000001".into()),
                description: "office".into(),
                cid: cid.map(String::from),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cell_change_is_recorded_and_reported() {
        let mut s = setup(RecordingControl::default()).await;
        register(&s, Some("100")).await;
        s.fake.state.lock().unwrap().cell_id = Some("200".into());

        let events = monitor(&s, false).reconcile(&mut s.fleet).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].previous_cid, "100");
        assert_eq!(events[0].current_cid, "200");
        assert!(!events[0].quarantined);

        let entry = s.storage.get(IMSI).await.unwrap().unwrap();
        assert_eq!(entry.cid.as_deref(), Some("200"));
        assert_eq!(entry.number.as_deref(), Some("+4915100000001"));
        assert!(s.fleet.contains("ttyUSB0"));
        assert!(s.control.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quarantine_removes_the_session() {
        let mut s = setup(RecordingControl::default()).await;
        register(&s, Some("100")).await;
        s.fake.state.lock().unwrap().cell_id = Some("200".into());

        let events = monitor(&s, true).reconcile(&mut s.fleet).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].quarantined);
        assert!(!s.fleet.contains("ttyUSB0"));
        assert!(s.fake.state.lock().unwrap().closed);
        assert_eq!(
            *s.control.resolved.lock().unwrap(),
            vec![PathBuf::from("/dev/ttyUSB0")]
        );
        assert_eq!(*s.control.removed.lock().unwrap(), vec!["1-1.2".to_string()]);
    }

    #[tokio::test]
    async fn test_quarantine_drops_session_when_resolution_fails() {
        let mut s = setup(RecordingControl {
            fail_resolve: true,
            ..Default::default()
        })
        .await;
        register(&s, Some("100")).await;
        s.fake.state.lock().unwrap().cell_id = Some("200".into());

        let events = monitor(&s, true).reconcile(&mut s.fleet).await;
        assert!(events[0].quarantined);
        assert!(s.fleet.is_empty());
        assert!(s.control.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_cell_emits_nothing() {
        let mut s = setup(RecordingControl::default()).await;
        register(&s, Some("100")).await;

        let events = monitor(&s, true).reconcile(&mut s.fleet).await;
        assert!(events.is_empty());
        assert!(s.fleet.contains("ttyUSB0"));
    }

    #[tokio::test]
    async fn test_unknown_imsi_is_registered_once() {
        let mut s = setup(RecordingControl::default()).await;
        let monitor = monitor(&s, true);

        assert!(monitor.reconcile(&mut s.fleet).await.is_empty());
        assert!(monitor.reconcile(&mut s.fleet).await.is_empty());

        let numbers = s.storage.list().await.unwrap();
        assert_eq!(numbers.len(), 1);
        assert_eq!(numbers[0], NumberEntry::first_seen(IMSI, Some("100".into())));
        assert!(s.fleet.contains("ttyUSB0"));
    }

    #[tokio::test]
    async fn test_unknown_imsi_without_cell_is_registered() {
        let mut s = setup(RecordingControl::default()).await;
        s.fake.state.lock().unwrap().cell_id = None;
        let monitor = monitor(&s, true);

        assert!(monitor.reconcile(&mut s.fleet).await.is_empty());
        assert_eq!(
            s.storage.list().await.unwrap(),
            vec![NumberEntry::first_seen(IMSI, None)]
        );

        // the cell shows up later and is recorded without an event
        s.fake.state.lock().unwrap().cell_id = Some("300".into());
        assert!(monitor.reconcile(&mut s.fleet).await.is_empty());
        assert_eq!(
            s.storage.get(IMSI).await.unwrap().unwrap().cid.as_deref(),
            Some("300")
        );
        assert!(s.fleet.contains("ttyUSB0"));
    }

    #[tokio::test]
    async fn test_first_cell_of_registered_number_is_silent() {
        let mut s = setup(RecordingControl::default()).await;
        register(&s, None).await;

        let events = monitor(&s, true).reconcile(&mut s.fleet).await;
        assert!(events.is_empty());
        assert_eq!(
            s.storage.get(IMSI).await.unwrap().unwrap().cid.as_deref(),
            Some("100")
        );
    }

    #[tokio::test]
    async fn test_timeout_skips_only_that_session() {
        let mut s = setup(RecordingControl::default()).await;
        register(&s, Some("100")).await;
        s.fake.state.lock().unwrap().network_times_out = true;

        let other = FakeModem::new(FakeModemState::new("262010000000002"));
        s.fleet
            .insert(ModemSession::from_driver(
                "ttyUSB2",
                Path::new("/dev/ttyUSB2"),
                Box::new(other),
            ))
            .unwrap();

        let events = monitor(&s, true).reconcile(&mut s.fleet).await;
        assert!(events.is_empty());
        assert_eq!(s.fleet.len(), 2);
        assert!(s.storage.get("262010000000002").await.unwrap().is_some());
    }
}
