use crate::error::{BridgeError, Result};
use std::sync::Arc;
use zb_api::{ApiError, Queue, ZulipApi};

/// The adapter's single Zulip session: the event queue handle and the id of
/// the last event forwarded from it.
///
/// Credentials live in the API client and never change; the queue handle and
/// cursor are replaced together whenever the queue is re-registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    queue: Option<Queue>,
}

impl Session {
    pub fn queue(&self) -> Option<&Queue> {
        self.queue.as_ref()
    }

    pub fn cursor(&self) -> Option<i64> {
        self.queue.as_ref().map(|queue| queue.last_event_id)
    }

    /// Record `event_id` as consumed. The cursor never moves backwards.
    pub(crate) fn advance(&mut self, event_id: i64) {
        if let Some(queue) = self.queue.as_mut() {
            queue.last_event_id = queue.last_event_id.max(event_id);
        }
    }

    /// Forget the queue handle after the server reported it invalid.
    pub(crate) fn discard(&mut self) {
        self.queue = None;
    }
}

pub struct SessionManager {
    api: Arc<dyn ZulipApi>,
}

impl SessionManager {
    pub fn new(api: Arc<dyn ZulipApi>) -> Self {
        Self { api }
    }

    /// Authenticate and register a fresh event queue.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn connect(&self) -> Result<Session> {
        match self.api.register_queue().await {
            Ok(queue) => {
                tracing::info!(queue_id = %queue.queue_id, "zulip session established");
                Ok(Session { queue: Some(queue) })
            }
            Err(ApiError::Auth(reason)) => Err(BridgeError::Auth(reason)),
            Err(error) => Err(error.into()),
        }
    }

    /// Drop the current queue handle and register a new one. The cursor
    /// restarts at the new queue's starting event id.
    ///
    /// On failure the session is left without a handle.
    pub async fn recover(&self, session: &mut Session) -> Result<()> {
        session.discard();
        let queue = self.api.register_queue().await?;
        tracing::info!(
            queue_id = %queue.queue_id,
            last_event_id = queue.last_event_id,
            "zulip event queue re-registered"
        );
        session.queue = Some(queue);
        Ok(())
    }
}
