use serde::{Deserialize, Serialize};

/// A stored message. `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i32,
    /// Device-reported send time, epoch seconds.
    pub timestamp: i64,
    pub imsi: String,
    pub sender: String,
    pub content: String,
}

/// A message about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub timestamp: i64,
    pub imsi: String,
    pub sender: String,
    pub content: String,
}

/// A registered SIM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberEntry {
    pub imsi: String,
    /// Unset until an operator registers the number.
    pub number: Option<String>,
    pub description: String,
    /// Last observed cell id.
    pub cid: Option<String>,
}

impl NumberEntry {
    /// Entry created on first sight of an unregistered SIM.
    pub fn first_seen(imsi: &str, cid: Option<String>) -> Self {
        Self {
            imsi: imsi.to_string(),
            number: None,
            description: String::new(),
            cid,
        }
    }
}

/// A message joined with the number entry of the receiving SIM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinedMessage {
    #[serde(flatten)]
    pub message: Message,
    pub number: Option<String>,
    pub description: Option<String>,
}
