use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::Mutex;

use crate::configuration::config::Config;
use crate::device_control::{DeviceControl, UdevDeviceControl};
use crate::discovery::{scan, DiscoveredDevice};
use crate::error_handling::types::*;
use crate::ingestion::{IngestionPipeline, IngestionReport, RunCoordinator, RunOutcome};
use crate::modem::{blocking_io, Connector};
use crate::monitoring::{CellMonitor, CidChangeEvent};
use crate::session_management::{FleetRegistry, FleetStatusEntry, ModemSession};
use crate::storage::{DatabaseStorage, JoinedMessage, MessageStore, NumberEntry, NumberRegistry};
use crate::web_interface::WebServer;

/// Owns the live fleet and every component acting on it.
///
/// Ingestion, reconciliation and status queries lock the fleet for their
/// whole duration, so the timer and HTTP requests never interleave on a
/// device. Ingestion first takes the run lock, which decides between
/// overlapping triggers in this process and in others.
pub struct Controller {
    config: Config,
    storage: Arc<DatabaseStorage>,
    fleet: Mutex<FleetRegistry>,
    pipeline: IngestionPipeline,
    coordinator: RunCoordinator,
    monitor: CellMonitor,
}

impl Controller {
    /// Opens the database and builds the components. The fleet starts
    /// empty; see [`Controller::discover`].
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        let storage = Arc::new(DatabaseStorage::new_file(&config.db_path).await?);
        Ok(Self::with_parts(config, storage, Arc::new(UdevDeviceControl)))
    }

    pub fn with_parts(
        config: Config,
        storage: Arc<DatabaseStorage>,
        device_control: Arc<dyn DeviceControl>,
    ) -> Self {
        let pipeline =
            IngestionPipeline::new(storage.clone(), config.delete_messages_after_ingest);
        let monitor = CellMonitor::new(storage.clone(), device_control, config.quarantine_mode);
        let coordinator = RunCoordinator::new(config.lock_path.clone());
        Self {
            config,
            storage,
            fleet: Mutex::new(FleetRegistry::new()),
            pipeline,
            coordinator,
            monitor,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Lists the modems attached to this host without opening sessions.
    pub fn scan(&self, connector: &dyn Connector) -> Result<Vec<DiscoveredDevice>, ControllerError> {
        Ok(scan(
            &self.config.device_dir,
            &self.config.exclude_set(),
            connector,
        )?)
    }

    /// Scans for modems and opens a session for each one found. Devices
    /// that fail to open are logged and left out of the fleet.
    pub async fn discover(&self, connector: &dyn Connector) -> Result<usize, ControllerError> {
        std::fs::create_dir_all(&self.config.temp_config_dir).map_err(|e| {
            ControllerError::InitializationFailed(format!(
                "unable to create {}: {}",
                self.config.temp_config_dir.display(),
                e
            ))
        })?;

        let devices = blocking_io(|| self.scan(connector))?;
        let driver_config = self.config.driver_config();

        let mut fleet = self.fleet.lock().await;
        for device in &devices {
            let session = match ModemSession::open(device, connector, &driver_config) {
                Ok(session) => session,
                Err(e) => {
                    warn!("Unable to open {}: {}", device.device_id, e);
                    continue;
                }
            };
            if let Err(e) = fleet.insert(session) {
                warn!("Not adding {} to the fleet: {}", device.device_id, e);
            }
        }
        info!(
            "{} of {} discovered modem(s) are live",
            fleet.len(),
            devices.len()
        );
        Ok(fleet.len())
    }

    /// One ingestion pass under the run lock.
    ///
    /// The run lock is taken before the fleet, so an overlapping call in this
    /// process is skipped instead of queueing behind the running pass.
    pub async fn ingest_once(&self) -> Result<RunOutcome<IngestionReport>, ControllerError> {
        let fleet = &self.fleet;
        let pipeline = &self.pipeline;
        Ok(self
            .coordinator
            .with_exclusive_run(move || async move {
                let mut fleet = fleet.lock().await;
                pipeline.run(&mut fleet).await
            })
            .await?)
    }

    pub async fn reconcile_once(&self) -> Vec<CidChangeEvent> {
        let mut fleet = self.fleet.lock().await;
        self.monitor.reconcile(&mut fleet).await
    }

    pub async fn fleet_status(&self) -> Vec<FleetStatusEntry> {
        self.fleet.lock().await.status()
    }

    pub async fn messages(&self) -> Result<Vec<JoinedMessage>, StorageError> {
        self.storage.list_joined().await
    }

    pub async fn list_numbers(&self) -> Result<Vec<NumberEntry>, ControllerError> {
        Ok(self.storage.list().await?)
    }

    pub async fn add_number(
        &self,
        imsi: &str,
        number: &str,
        description: &str,
    ) -> Result<(), ControllerError> {
        let entry = NumberEntry {
            imsi: imsi.to_string(),
            number: Some(number.to_string()),
            description: description.to_string(),
            cid: None,
        };
        self.storage.create(&entry).await?;
        info!("Registered {} as {}", imsi, number);
        Ok(())
    }

    /// Changes the number and/or description of a registered SIM, keeping
    /// its recorded cell.
    pub async fn edit_number(
        &self,
        imsi: &str,
        number: Option<String>,
        description: Option<String>,
    ) -> Result<NumberEntry, ControllerError> {
        let mut entry = self
            .storage
            .get(imsi)
            .await?
            .ok_or_else(|| StorageError::NotFound(imsi.to_string()))?;
        if let Some(number) = number {
            entry.number = Some(number);
        }
        if let Some(description) = description {
            entry.description = description;
        }
        self.storage.update(&entry).await?;
        Ok(entry)
    }

    pub async fn delete_number(&self, imsi: &str) -> Result<(), ControllerError> {
        self.storage.delete(imsi).await?;
        info!("Deleted number entry {}", imsi);
        Ok(())
    }

    /// One timer tick: ingest, then reconcile.
    pub async fn tick(&self) {
        match self.ingest_once().await {
            Ok(RunOutcome::Completed(report)) if report.failed_count() > 0 => warn!(
                "{} session(s) failed during ingestion",
                report.failed_count()
            ),
            Ok(_) => {}
            Err(e) => error!("Ingestion pass failed: {}", e),
        }
        let events = self.reconcile_once().await;
        if !events.is_empty() {
            warn!("{} cell change(s) detected", events.len());
        }
    }

    async fn poll_loop(&self) {
        let Some(period) = self.config.poll_interval() else {
            info!("Periodic ingestion disabled");
            return std::future::pending().await;
        };
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// Serves the web interface and runs the timer until Ctrl-C, then closes
    /// every session.
    ///
    /// The timer runs as its own task so that a pass blocked on a slow modem
    /// never stalls the web server or the shutdown signal.
    pub async fn run(self: Arc<Self>) -> Result<(), ControllerError> {
        let bind_address = self.config.web_bind_address.clone();
        let server = WebServer::new(self.clone());
        let poller = tokio::spawn({
            let controller = self.clone();
            async move { controller.poll_loop().await }
        });

        let result = tokio::select! {
            res = server.start(&bind_address) => {
                warn!("Web server stopped");
                res.map_err(ControllerError::from)
            }
            res = tokio::signal::ctrl_c() => {
                match res {
                    Ok(()) => info!("Shutdown requested"),
                    Err(e) => error!("Unable to listen for shutdown signal: {}", e),
                }
                Ok(())
            }
        };

        poller.abort();
        if let Err(e) = poller.await {
            if !e.is_cancelled() {
                error!("Poll loop ended abnormally: {}", e);
            }
        }
        self.shutdown().await;
        result
    }

    pub async fn shutdown(&self) {
        self.fleet.lock().await.shutdown_all();
    }
}
