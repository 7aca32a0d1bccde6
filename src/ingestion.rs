//! Ingestion of pending device messages into the message store.
//!
//! - `pipeline`: one pass over every live session, persisting new messages.
//! - `coordinator`: the cross-process run lock an ingestion pass runs under.

pub mod coordinator;
pub mod pipeline;

pub use coordinator::{RunCoordinator, RunGuard, RunOutcome};
pub use pipeline::{IngestionPipeline, IngestionReport, SessionOutcome, SessionReport};
