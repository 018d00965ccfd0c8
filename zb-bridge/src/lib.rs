//! Zulip adapter for the relay bus.
//!
//! The adapter is pure translation and delivery: Zulip message events become
//! bus [`InboundMessage`]s, bus [`BusMessage`]s become Zulip API calls.

mod attachments;
mod dispatcher;
mod error;
mod poller;
mod session;
mod streams;
#[cfg(test)]
mod testing;
mod topics;
mod traits;
mod types;
mod zulip;

pub use attachments::{AttachmentStaging, InlineStaging, Staged, StagedFile};
pub use dispatcher::OutboundDispatcher;
pub use error::{BridgeError, Result};
pub use poller::{EventPoller, PollExit, PollTimings};
pub use session::{Session, SessionManager};
pub use streams::StreamDirectory;
pub use topics::{FALLBACK_TOPIC, TopicResolver};
pub use traits::Bridge;
pub use types::{
    BusEvent, BusMessage, ChannelInfo, Edit, FileInfo, InboundMessage, OutboundMessage, Post,
    Upload,
};
pub use zulip::{ZulipBridge, ZulipSettings};
