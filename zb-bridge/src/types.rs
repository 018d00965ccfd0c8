use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message handed from this adapter to the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub username: String,
    pub text: String,
    pub channel: String,
    pub account: String,
    pub user_id: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusEvent {
    #[default]
    Post,
    Edit,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// A message as the bus delivers it, with flag-style fields.
///
/// Convert it into an [`OutboundMessage`] before dispatching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    #[serde(default)]
    pub event: BusEvent,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub username: String,
    pub channel: String,
    #[serde(default)]
    pub files: Vec<FileInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    #[serde(default)]
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub channel: String,
    pub username: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub id: String,
    pub channel: String,
    pub username: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub channel: String,
    pub username: String,
    pub text: String,
    pub files: Vec<FileInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Post(Post),
    Edit(Edit),
    Delete { id: Option<String> },
    Upload(Upload),
}

impl Post {
    /// Zulip content: the bus-formatted username followed by the text.
    pub fn content(&self) -> String {
        format!("{}{}", self.username, self.text)
    }
}

impl Edit {
    pub fn content(&self) -> String {
        format!("{}{}", self.username, self.text)
    }
}

impl From<BusMessage> for OutboundMessage {
    fn from(message: BusMessage) -> Self {
        let id = Some(message.id.trim().to_string()).filter(|id| !id.is_empty());
        if message.event == BusEvent::Delete {
            return Self::Delete { id };
        }
        if !message.files.is_empty() {
            return Self::Upload(Upload {
                channel: message.channel,
                username: message.username,
                text: message.text,
                files: message.files,
            });
        }
        match id {
            Some(id) => Self::Edit(Edit {
                id,
                channel: message.channel,
                username: message.username,
                text: message.text,
            }),
            None => Self::Post(Post {
                channel: message.channel,
                username: message.username,
                text: message.text,
            }),
        }
    }
}
