use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::error_handling::types::{ModemError, StorageError};
use crate::modem::{Cursor, DeviceMessage, Page};
use crate::session_management::{FleetRegistry, ModemSession};
use crate::storage::{MessageStore, NewMessage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    /// The session was aborted; messages persisted before the failure stay.
    Failed(String),
}

/// What one session contributed to an ingestion pass.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub device_id: String,
    pub imsi: Option<String>,
    pub read: u32,
    pub persisted: u32,
    pub duplicates: u32,
    pub store_failures: u32,
    pub deleted: u32,
    pub delete_failures: u32,
    pub outcome: SessionOutcome,
}

impl SessionReport {
    fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            imsi: None,
            read: 0,
            persisted: 0,
            duplicates: 0,
            store_failures: 0,
            deleted: 0,
            delete_failures: 0,
            outcome: SessionOutcome::Completed,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub sessions: Vec<SessionReport>,
}

impl IngestionReport {
    pub fn failed_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_failed()).count()
    }

    pub fn total_read(&self) -> u32 {
        self.sessions.iter().map(|s| s.read).sum()
    }

    pub fn total_persisted(&self) -> u32 {
        self.sessions.iter().map(|s| s.persisted).sum()
    }

    pub fn total_duplicates(&self) -> u32 {
        self.sessions.iter().map(|s| s.duplicates).sum()
    }
}

/// Reads every pending message of every live session into the message store.
///
/// A session is read from [`Cursor::Start`] until the number of messages
/// read reaches the device's reported pending total, or the device reports
/// the end of its store. A device error aborts that session only.
pub struct IngestionPipeline {
    store: Arc<dyn MessageStore>,
    delete_after_ingest: bool,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn MessageStore>, delete_after_ingest: bool) -> Self {
        Self {
            store,
            delete_after_ingest,
        }
    }

    pub async fn run(&self, fleet: &mut FleetRegistry) -> IngestionReport {
        let mut report = IngestionReport::default();

        for session in fleet.sessions_mut() {
            let mut session_report = SessionReport::new(session.device_id());
            if let Err(e) = self.ingest_session(session, &mut session_report).await {
                if e.is_timeout() {
                    warn!("{} timed out during ingestion: {}", session.device_id(), e);
                } else {
                    error!("Ingestion of {} aborted: {}", session.device_id(), e);
                }
                session_report.outcome = SessionOutcome::Failed(e.to_string());
            }
            report.sessions.push(session_report);
        }

        info!(
            "Ingestion pass done: {} sessions, {} read, {} persisted, {} duplicates, {} failed",
            report.sessions.len(),
            report.total_read(),
            report.total_persisted(),
            report.total_duplicates(),
            report.failed_count()
        );
        report
    }

    async fn ingest_session(
        &self,
        session: &mut ModemSession,
        report: &mut SessionReport,
    ) -> Result<(), ModemError> {
        let imsi = session.identity()?;
        report.imsi = Some(imsi.clone());

        let pending = session.message_store_status()?.used_total();
        if pending == 0 {
            debug!("No pending messages on {}", session.device_id());
            return Ok(());
        }
        debug!("{} reports {} pending messages", session.device_id(), pending);

        let mut cursor = Cursor::Start;
        while report.read < pending {
            let (messages, next) = match session.next_message(cursor)? {
                Page::EndOfStore => break,
                Page::Messages { messages, cursor } => (messages, cursor),
            };
            if messages.is_empty() {
                break;
            }
            for message in messages {
                report.read += 1;
                self.persist(session, &imsi, message, report).await;
            }
            cursor = next;
        }
        Ok(())
    }

    async fn persist(
        &self,
        session: &mut ModemSession,
        imsi: &str,
        message: DeviceMessage,
        report: &mut SessionReport,
    ) {
        let new = NewMessage {
            timestamp: message.timestamp,
            imsi: imsi.to_string(),
            sender: message.sender,
            content: message.content,
        };

        match self.store.insert_message(&new).await {
            Ok(id) => {
                report.persisted += 1;
                debug!(
                    "Persisted message {} from location {} on {}",
                    id,
                    message.location,
                    session.device_id()
                );
                if self.delete_after_ingest {
                    match session.delete_message(message.location) {
                        Ok(()) => report.deleted += 1,
                        Err(e) => {
                            report.delete_failures += 1;
                            warn!(
                                "Unable to delete location {} on {}: {}",
                                message.location,
                                session.device_id(),
                                e
                            );
                        }
                    }
                }
            }
            Err(StorageError::DuplicateMessage) => {
                report.duplicates += 1;
                warn!(
                    "Message at location {} on {} is already stored, skipping",
                    message.location,
                    session.device_id()
                );
            }
            Err(e) => {
                report.store_failures += 1;
                error!(
                    "Unable to store message at location {} on {}: {}",
                    message.location,
                    session.device_id(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::fake::{FakeModem, FakeModemState};
    use crate::storage::JoinedMessage;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    /// Store double keeping messages in memory with the same identity rule
    /// as the database.
    #[derive(Default)]
    struct MemoryStore {
        messages: Mutex<Vec<NewMessage>>,
        fail_writes: bool,
    }

    #[async_trait]
    impl MessageStore for MemoryStore {
        async fn insert_message(&self, message: &NewMessage) -> Result<i32, StorageError> {
            if self.fail_writes {
                return Err(StorageError::WriteFailed);
            }
            let mut messages = self.messages.lock().unwrap();
            if messages.contains(message) {
                return Err(StorageError::DuplicateMessage);
            }
            messages.push(message.clone());
            Ok(messages.len() as i32)
        }

        async fn list_joined(&self) -> Result<Vec<JoinedMessage>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn fleet_with(state: FakeModemState) -> (FleetRegistry, FakeModem) {
        let fake = FakeModem::new(state);
        let mut fleet = FleetRegistry::new();
        fleet
            .insert(ModemSession::from_driver(
                "ttyUSB0",
                Path::new("/dev/ttyUSB0"),
                Box::new(fake.clone()),
            ))
            .unwrap();
        (fleet, fake)
    }

    #[tokio::test]
    async fn reads_until_pending_total() {
        let store = Arc::new(MemoryStore::default());
        let (mut fleet, fake) = fleet_with(FakeModemState::new("262010000000001").with_messages(3));
        let pipeline = IngestionPipeline::new(store.clone(), false);

        let report = pipeline.run(&mut fleet).await;
        assert_eq!(report.sessions[0].read, 3);
        assert_eq!(report.total_persisted(), 3);
        assert_eq!(report.failed_count(), 0);
        assert_eq!(fake.state.lock().unwrap().pages_served, 3);
        assert_eq!(store.messages.lock().unwrap()[0].imsi, "262010000000001");
    }

    #[tokio::test]
    async fn empty_store_reads_nothing() {
        let store = Arc::new(MemoryStore::default());
        let (mut fleet, fake) = fleet_with(FakeModemState::new("262010000000001"));
        let report = IngestionPipeline::new(store, false).run(&mut fleet).await;

        assert_eq!(report.sessions[0].read, 0);
        assert_eq!(report.sessions[0].outcome, SessionOutcome::Completed);
        assert_eq!(fake.state.lock().unwrap().pages_served, 0);
    }

    #[tokio::test]
    async fn multi_message_pages_are_fully_consumed() {
        let store = Arc::new(MemoryStore::default());
        let mut state = FakeModemState::new("262010000000001").with_messages(5);
        state.page_size = 2;
        let (mut fleet, fake) = fleet_with(state);

        let report = IngestionPipeline::new(store, false).run(&mut fleet).await;
        assert_eq!(report.sessions[0].persisted, 5);
        assert_eq!(fake.state.lock().unwrap().pages_served, 3);
    }

    #[tokio::test]
    async fn delete_after_ingest_removes_persisted_messages() {
        let store = Arc::new(MemoryStore::default());
        let (mut fleet, fake) = fleet_with(FakeModemState::new("262010000000001").with_messages(2));

        let report = IngestionPipeline::new(store, true).run(&mut fleet).await;
        assert_eq!(report.sessions[0].deleted, 2);
        assert_eq!(fake.state.lock().unwrap().deleted, vec![1, 2]);
        assert!(fake.state.lock().unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn duplicates_are_not_deleted() {
        let store = Arc::new(MemoryStore::default());
        let (mut fleet, fake) = fleet_with(FakeModemState::new("262010000000001").with_messages(2));

        IngestionPipeline::new(store.clone(), false).run(&mut fleet).await;
        let report = IngestionPipeline::new(store, true).run(&mut fleet).await;
        assert_eq!(report.total_duplicates(), 2);
        assert_eq!(report.sessions[0].deleted, 0);
        assert!(fake.state.lock().unwrap().deleted.is_empty());
    }

    #[tokio::test]
    async fn delete_failure_keeps_the_stored_message() {
        let store = Arc::new(MemoryStore::default());
        let mut state = FakeModemState::new("262010000000001").with_messages(1);
        state.delete_fails = true;
        let (mut fleet, _fake) = fleet_with(state);

        let report = IngestionPipeline::new(store.clone(), true).run(&mut fleet).await;
        assert_eq!(report.sessions[0].delete_failures, 1);
        assert_eq!(report.sessions[0].outcome, SessionOutcome::Completed);
        assert_eq!(store.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn store_failures_do_not_abort_the_session() {
        let store = Arc::new(MemoryStore {
            fail_writes: true,
            ..Default::default()
        });
        let (mut fleet, _fake) = fleet_with(FakeModemState::new("262010000000001").with_messages(2));

        let report = IngestionPipeline::new(store, true).run(&mut fleet).await;
        assert_eq!(report.sessions[0].store_failures, 2);
        assert_eq!(report.sessions[0].deleted, 0);
        assert!(!report.sessions[0].is_failed());
    }

    #[tokio::test]
    async fn identity_timeout_fails_the_session() {
        let store = Arc::new(MemoryStore::default());
        let mut state = FakeModemState::new("262010000000001").with_messages(1);
        state.identity_times_out = true;
        let (mut fleet, _fake) = fleet_with(state);

        let report = IngestionPipeline::new(store, false).run(&mut fleet).await;
        assert!(report.sessions[0].is_failed());
        assert_eq!(report.sessions[0].imsi, None);
    }
}
