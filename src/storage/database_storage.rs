use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use log::{debug, error, info};
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, QueryOrder, Schema, SqlErr,
};

use crate::error_handling::types::StorageError;
use crate::storage::db_entities::{messages, numbers};
use crate::storage::storage_trait::{MessageStore, NumberRegistry};
use crate::storage::types::{JoinedMessage, Message, NewMessage, NumberEntry};

/// Natural identity of a message. Two modems may report the same send time,
/// so the timestamp alone is not enough.
const MESSAGE_IDENTITY_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_identity \
     ON messages (imsi, timestamp, sender, content)";

impl From<messages::Model> for Message {
    fn from(row: messages::Model) -> Self {
        Message {
            id: row.id,
            timestamp: row.timestamp,
            imsi: row.imsi,
            sender: row.sender,
            content: row.content,
        }
    }
}

impl From<numbers::Model> for NumberEntry {
    fn from(row: numbers::Model) -> Self {
        NumberEntry {
            imsi: row.imsi,
            number: row.number,
            description: row.description,
            cid: row.cid,
        }
    }
}

fn number_active_model(entry: &NumberEntry) -> numbers::ActiveModel {
    numbers::ActiveModel {
        imsi: Set(entry.imsi.clone()),
        number: Set(entry.number.clone()),
        description: Set(entry.description.clone()),
        cid: Set(entry.cid.clone()),
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// SQLite-backed message store and number registry.
pub struct DatabaseStorage {
    db: DatabaseConnection,
}

impl DatabaseStorage {
    /// Create or open the database at `path`, creating parent directories
    /// and the schema as needed.
    pub async fn new_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    error!("Failed to create database dir {}: {}", parent.display(), e);
                    StorageError::WriteFailed
                })?;
            }
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let db = Database::connect(url).await.map_err(|e| {
            error!("Failed to open database {}: {}", path.display(), e);
            StorageError::ConnectionFailed
        })?;

        let storage = Self { db };
        storage.create_schema().await?;
        info!("Database ready at {}", path.display());
        Ok(storage)
    }

    async fn create_schema(&self) -> Result<(), StorageError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut messages_table = schema.create_table_from_entity(messages::Entity);
        messages_table.if_not_exists();
        let mut numbers_table = schema.create_table_from_entity(numbers::Entity);
        numbers_table.if_not_exists();

        for table in [messages_table, numbers_table] {
            self.db.execute(backend.build(&table)).await.map_err(|e| {
                error!("Failed to create table: {}", e);
                StorageError::WriteFailed
            })?;
        }
        self.db
            .execute_unprepared(MESSAGE_IDENTITY_INDEX)
            .await
            .map_err(|e| {
                error!("Failed to create message index: {}", e);
                StorageError::WriteFailed
            })?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for DatabaseStorage {
    async fn insert_message(&self, message: &NewMessage) -> Result<i32, StorageError> {
        let row = messages::ActiveModel {
            id: NotSet,
            timestamp: Set(message.timestamp),
            imsi: Set(message.imsi.clone()),
            sender: Set(message.sender.clone()),
            content: Set(message.content.clone()),
        };
        match messages::Entity::insert(row).exec(&self.db).await {
            Ok(res) => {
                debug!("Stored message {} for {}", res.last_insert_id, message.imsi);
                Ok(res.last_insert_id)
            }
            Err(e) if is_unique_violation(&e) => Err(StorageError::DuplicateMessage),
            Err(e) => {
                error!("Failed to store message for {}: {}", message.imsi, e);
                Err(StorageError::WriteFailed)
            }
        }
    }

    async fn list_joined(&self) -> Result<Vec<JoinedMessage>, StorageError> {
        let rows = messages::Entity::find()
            .order_by_desc(messages::Column::Timestamp)
            .order_by_desc(messages::Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| {
                error!("Failed to load messages: {}", e);
                StorageError::ReadFailed
            })?;
        let numbers: HashMap<String, NumberEntry> = self
            .list()
            .await?
            .into_iter()
            .map(|n| (n.imsi.clone(), n))
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let entry = numbers.get(&row.imsi);
                JoinedMessage {
                    number: entry.and_then(|n| n.number.clone()),
                    description: entry.map(|n| n.description.clone()),
                    message: row.into(),
                }
            })
            .collect())
    }
}

#[async_trait]
impl NumberRegistry for DatabaseStorage {
    async fn get(&self, imsi: &str) -> Result<Option<NumberEntry>, StorageError> {
        numbers::Entity::find_by_id(imsi.to_string())
            .one(&self.db)
            .await
            .map(|row| row.map(NumberEntry::from))
            .map_err(|e| {
                error!("Failed to load number {}: {}", imsi, e);
                StorageError::ReadFailed
            })
    }

    async fn create(&self, entry: &NumberEntry) -> Result<(), StorageError> {
        match numbers::Entity::insert(number_active_model(entry))
            .exec_without_returning(&self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::AlreadyExists(entry.imsi.clone())),
            Err(e) => {
                error!("Failed to create number {}: {}", entry.imsi, e);
                Err(StorageError::WriteFailed)
            }
        }
    }

    async fn update(&self, entry: &NumberEntry) -> Result<(), StorageError> {
        match numbers::Entity::update(number_active_model(entry))
            .exec(&self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(StorageError::NotFound(entry.imsi.clone())),
            Err(e) => {
                error!("Failed to update number {}: {}", entry.imsi, e);
                Err(StorageError::WriteFailed)
            }
        }
    }

    async fn delete(&self, imsi: &str) -> Result<(), StorageError> {
        let res = numbers::Entity::delete_by_id(imsi.to_string())
            .exec(&self.db)
            .await
            .map_err(|e| {
                error!("Failed to delete number {}: {}", imsi, e);
                StorageError::WriteFailed
            })?;
        if res.rows_affected == 0 {
            return Err(StorageError::NotFound(imsi.to_string()));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<NumberEntry>, StorageError> {
        numbers::Entity::find()
            .order_by_asc(numbers::Column::Imsi)
            .all(&self.db)
            .await
            .map(|rows| rows.into_iter().map(NumberEntry::from).collect())
            .map_err(|e| {
                error!("Failed to list numbers: {}", e);
                StorageError::ReadFailed
            })
    }
}
