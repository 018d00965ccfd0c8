use crate::session::{Session, SessionManager};
use crate::streams::StreamDirectory;
use crate::types::InboundMessage;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zb_api::{ApiError, EventBatch, ZulipApi, ZulipMessage};

/// Cooldowns used by the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimings {
    /// After the server asked us to back off, or the request never got a response.
    pub backoff: Duration,
    /// After a non-JSON or 5xx response.
    pub unavailable: Duration,
    /// Between failed queue re-registrations.
    pub recover: Duration,
    /// Between successful fetch cycles.
    pub idle: Duration,
}

impl Default for PollTimings {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(5),
            unavailable: Duration::from_secs(10),
            recover: Duration::from_secs(10),
            idle: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Cancelled,
    BusClosed,
}

/// Long-polls the session's event queue and forwards message events to the bus.
pub struct EventPoller {
    api: Arc<dyn ZulipApi>,
    sessions: Arc<SessionManager>,
    streams: Arc<StreamDirectory>,
    login: String,
    account: String,
    timings: PollTimings,
    tx: mpsc::Sender<InboundMessage>,
    shutdown: CancellationToken,
}

impl EventPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<dyn ZulipApi>,
        sessions: Arc<SessionManager>,
        streams: Arc<StreamDirectory>,
        login: &str,
        account: &str,
        timings: PollTimings,
        tx: mpsc::Sender<InboundMessage>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            api,
            sessions,
            streams,
            login: login.trim().to_string(),
            account: account.to_string(),
            timings,
            tx,
            shutdown,
        }
    }

    /// Runs until the shutdown token fires or the bus stops accepting messages.
    ///
    /// Every fetch failure is absorbed here. The cursor in `session` moves past
    /// a relayed message only after it has been handed to the bus; heartbeats,
    /// our own messages and ignored event types are acknowledged as seen.
    #[tracing::instrument(level = "info", skip_all, fields(account = %self.account))]
    pub async fn run(&self, session: &mut Session) -> PollExit {
        loop {
            if self.shutdown.is_cancelled() {
                return PollExit::Cancelled;
            }

            let Some(queue) = session.queue().cloned() else {
                if let Err(error) = self.sessions.recover(session).await {
                    tracing::error!(
                        %error,
                        delay = ?self.timings.recover,
                        "zulip queue re-registration failed; retrying"
                    );
                    if !self.pause(self.timings.recover).await {
                        return PollExit::Cancelled;
                    }
                }
                continue;
            };

            let fetched = tokio::select! {
                _ = self.shutdown.cancelled() => return PollExit::Cancelled,
                fetched = self.api.get_events(&queue) => fetched,
            };

            let batch = match fetched {
                Ok(batch) => batch,
                Err(ApiError::Heartbeat { last_event_id }) => {
                    tracing::debug!(last_event_id, "zulip heartbeat received");
                    session.advance(last_event_id);
                    continue;
                }
                Err(ApiError::Backoff) => {
                    tracing::warn!(delay = ?self.timings.backoff, "zulip asked us to back off");
                    if !self.pause(self.timings.backoff).await {
                        return PollExit::Cancelled;
                    }
                    continue;
                }
                Err(error @ ApiError::Http(_)) => {
                    tracing::warn!(
                        %error,
                        delay = ?self.timings.backoff,
                        "zulip event fetch failed; retrying"
                    );
                    if !self.pause(self.timings.backoff).await {
                        return PollExit::Cancelled;
                    }
                    continue;
                }
                Err(
                    error @ (ApiError::MalformedResponse(_)
                    | ApiError::Unavailable(_)
                    | ApiError::Auth(_)),
                ) => {
                    tracing::error!(
                        %error,
                        delay = ?self.timings.unavailable,
                        "zulip response unusable, server down or restarting?"
                    );
                    if !self.pause(self.timings.unavailable).await {
                        return PollExit::Cancelled;
                    }
                    continue;
                }
                Err(ApiError::BadEventQueue(reason)) => {
                    tracing::info!(%reason, "zulip event queue expired; re-registering");
                    session.discard();
                    continue;
                }
                Err(error) => {
                    tracing::debug!(%error, "zulip event fetch error");
                    continue;
                }
            };

            match self.forward(batch, session).await {
                Ok(forwarded) => tracing::debug!(forwarded, "zulip poll cycle complete"),
                Err(exit) => return exit,
            }

            if !self.pause(self.timings.idle).await {
                return PollExit::Cancelled;
            }
        }
    }

    async fn forward(&self, batch: EventBatch, session: &mut Session) -> Result<usize, PollExit> {
        let mut forwarded = 0usize;
        for event in batch.messages {
            if session.cursor().is_some_and(|cursor| event.id <= cursor) {
                tracing::debug!(event_id = event.id, "skipping already forwarded zulip event");
                continue;
            }
            if is_own_message(&event.message, &self.login) {
                session.advance(event.id);
                continue;
            }

            let channel = match event.message.stream_id {
                Some(stream_id) => self.streams.resolve(stream_id).await,
                None => String::new(),
            };
            let inbound = build_inbound_message(&event.message, channel, &self.account);
            tracing::debug!(
                event_id = event.id,
                username = %inbound.username,
                channel = %inbound.channel,
                "forwarding zulip message to bus"
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(PollExit::Cancelled),
                sent = self.tx.send(inbound) => {
                    if sent.is_err() {
                        tracing::warn!("bus inbound channel closed; stopping zulip poll loop");
                        return Err(PollExit::BusClosed);
                    }
                }
            }
            session.advance(event.id);
            forwarded += 1;
        }
        if let Some(last_event_id) = batch.last_event_id {
            session.advance(last_event_id);
        }
        Ok(forwarded)
    }

    /// Sleep unless shutdown fires first. Returns false on shutdown.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

fn is_own_message(message: &ZulipMessage, login: &str) -> bool {
    !login.is_empty() && message.sender_email.trim().eq_ignore_ascii_case(login)
}

fn build_inbound_message(
    message: &ZulipMessage,
    channel: String,
    account: &str,
) -> InboundMessage {
    InboundMessage {
        username: message.sender_full_name.clone(),
        text: message.content.clone(),
        channel,
        account: account.to_string(),
        user_id: message.sender_id.to_string(),
        avatar: message
            .avatar_url
            .clone()
            .filter(|avatar| !avatar.trim().is_empty()),
        received_at: Utc::now(),
    }
}
