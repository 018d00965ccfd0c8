use serde::{Deserialize, Serialize};

/// A registered event queue and the id of the last event consumed from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub queue_id: String,
    pub last_event_id: i64,
}

/// One `message` event pulled from an event queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub id: i64,
    pub message: ZulipMessage,
}

/// The message events of one long-poll, plus the highest event id in it
/// regardless of event type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    pub messages: Vec<MessageEvent>,
    pub last_event_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZulipMessage {
    pub id: i64,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default)]
    pub sender_id: i64,
    #[serde(default)]
    pub sender_full_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub stream_id: Option<i64>,
    #[serde(default)]
    pub content: String,
    /// `stream` or `private`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub stream_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub stream: String,
    pub topic: String,
    pub content: String,
}
