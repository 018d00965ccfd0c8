//! Zulip REST client for zulipbridge.
//!
//! Pure HTTP client: queue registration, event long-polling, stream listing
//! and message post/edit. The bridge core only sees the [`ZulipApi`] trait.

mod client;
mod error;
mod traits;
mod types;

pub use client::ZulipClient;
pub use error::{ApiError, Result};
pub use traits::ZulipApi;
pub use types::{EventBatch, MessageEvent, OutgoingMessage, Queue, Stream, ZulipMessage};
