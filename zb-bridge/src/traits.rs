use crate::error::Result;
use crate::types::{ChannelInfo, InboundMessage, OutboundMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait Bridge: Send + Sync {
    /// Account tag stamped on every inbound message: "zulip.work".
    fn account(&self) -> &str;

    /// Authenticate and start receiving. Push to tx for each inbound message.
    async fn connect(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()>;

    /// The bus now relays for this channel.
    async fn join_channel(&self, channel: ChannelInfo) -> Result<()>;

    /// Deliver one bus message. Returns the remote message id, or "" when the
    /// operation has none (edit, delete).
    async fn send(&self, message: OutboundMessage) -> Result<String>;

    async fn disconnect(&self) -> Result<()>;
}
