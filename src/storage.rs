//! Storage subsystem
//!
//! This module provides the durable state of the gateway: received messages
//! and the registry of known SIMs (numbers).
//!
//! Components:
//! - `storage_trait`: the `MessageStore` and `NumberRegistry` traits.
//! - `types`: shared data types used by storage backends.
//! - `database_storage`: ORM-based SQLite implementation using SeaORM.
//! - `db_entities`: SeaORM entity models for the database backend.

pub mod database_storage;
pub mod db_entities;
pub mod storage_trait;
pub mod types;

pub use database_storage::DatabaseStorage;
pub use storage_trait::{MessageStore, NumberRegistry};
pub use types::{JoinedMessage, Message, NewMessage, NumberEntry};
