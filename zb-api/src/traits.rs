use crate::error::Result;
use crate::types::{EventBatch, OutgoingMessage, Queue, Stream};
use async_trait::async_trait;

/// The slice of the Zulip API the bridge needs.
#[async_trait]
pub trait ZulipApi: Send + Sync {
    /// Authenticate and register a fresh event queue for message events.
    async fn register_queue(&self) -> Result<Queue>;

    /// Long-poll the queue for events newer than `queue.last_event_id`.
    ///
    /// A batch made only of heartbeats is reported as [`crate::ApiError::Heartbeat`].
    /// Other event types are left out of [`EventBatch::messages`] but still
    /// count towards [`EventBatch::last_event_id`].
    async fn get_events(&self, queue: &Queue) -> Result<EventBatch>;

    async fn get_streams(&self) -> Result<Vec<Stream>>;

    /// Post a stream message and return the raw response body.
    async fn send_message(&self, message: &OutgoingMessage) -> Result<String>;

    async fn update_message(&self, message_id: &str, content: &str) -> Result<()>;
}
