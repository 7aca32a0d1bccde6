//! Storage Traits
//!
//! This module defines the interfaces the ingestion engine and the
//! presentation layer use to reach durable state:
//! - [`MessageStore`]: append-only message log with a uniqueness constraint
//! - [`NumberRegistry`]: the SIM registry keyed by IMSI
//!
//! All methods return a `Result` to handle potential storage errors.

use async_trait::async_trait;

use crate::error_handling::types::StorageError;
use crate::storage::types::{JoinedMessage, NewMessage, NumberEntry};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Inserts a message and returns its store-assigned id.
    ///
    /// Fails with [`StorageError::DuplicateMessage`] when the same message
    /// is already stored.
    async fn insert_message(&self, message: &NewMessage) -> Result<i32, StorageError>;

    /// All messages, newest first, with the receiving number when known.
    async fn list_joined(&self) -> Result<Vec<JoinedMessage>, StorageError>;
}

#[async_trait]
pub trait NumberRegistry: Send + Sync {
    async fn get(&self, imsi: &str) -> Result<Option<NumberEntry>, StorageError>;

    /// Fails with [`StorageError::AlreadyExists`] if the IMSI is registered.
    async fn create(&self, entry: &NumberEntry) -> Result<(), StorageError>;

    /// Fails with [`StorageError::NotFound`] if the IMSI is not registered.
    async fn update(&self, entry: &NumberEntry) -> Result<(), StorageError>;

    async fn delete(&self, imsi: &str) -> Result<(), StorageError>;

    async fn list(&self) -> Result<Vec<NumberEntry>, StorageError>;
}
