//! Scripted in-memory Zulip API for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zb_api::{
    ApiError, EventBatch, MessageEvent, OutgoingMessage, Queue, Result, Stream, ZulipApi,
    ZulipMessage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Register,
    GetEvents(Queue),
    GetStreams,
    Send(OutgoingMessage),
    Update { id: String, content: String },
}

/// An event held by the fake server's queue.
#[derive(Debug, Clone)]
pub(crate) enum Queued {
    Heartbeat(i64),
    Message(MessageEvent),
    /// An event type the client does not relay.
    Other(i64),
}

impl Queued {
    fn id(&self) -> i64 {
        match self {
            Queued::Heartbeat(id) | Queued::Other(id) => *id,
            Queued::Message(event) => event.id,
        }
    }
}

/// Replays scripted results in order. Once the fetch script runs out, fetches
/// are answered from the queued events newer than the caller's cursor, the way
/// a Zulip server does. When nothing newer is queued the `drained` token is
/// cancelled, which ends any poll loop driven by it.
#[derive(Default)]
pub(crate) struct FakeApi {
    calls: Mutex<Vec<Call>>,
    registrations: Mutex<VecDeque<Result<Queue>>>,
    registered: AtomicI64,
    fetches: Mutex<VecDeque<Result<EventBatch>>>,
    queued: Mutex<Vec<Queued>>,
    directory: Mutex<Vec<Stream>>,
    stream_failures: Mutex<usize>,
    send_bodies: Mutex<VecDeque<Result<String>>>,
    next_message_id: AtomicI64,
    drained: CancellationToken,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(100),
            ..Self::default()
        }
    }

    pub(crate) fn with_registration(self, result: Result<Queue>) -> Self {
        self.registrations.lock().unwrap().push_back(result);
        self
    }

    pub(crate) fn with_fetch(self, result: Result<Vec<MessageEvent>>) -> Self {
        let result = result.map(|messages| EventBatch {
            last_event_id: messages.iter().map(|event| event.id).max(),
            messages,
        });
        self.fetches.lock().unwrap().push_back(result);
        self
    }

    pub(crate) fn with_queued(self, event: Queued) -> Self {
        self.queued.lock().unwrap().push(event);
        self
    }

    pub(crate) fn with_streams(self, streams: Vec<Stream>) -> Self {
        self.set_streams(streams);
        self
    }

    pub(crate) fn with_stream_failure(self) -> Self {
        *self.stream_failures.lock().unwrap() += 1;
        self
    }

    pub(crate) fn with_send_body(self, result: Result<String>) -> Self {
        self.send_bodies.lock().unwrap().push_back(result);
        self
    }

    pub(crate) fn set_streams(&self, streams: Vec<Stream>) {
        *self.directory.lock().unwrap() = streams;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub(crate) fn drained(&self) -> CancellationToken {
        self.drained.clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ZulipApi for FakeApi {
    async fn register_queue(&self) -> Result<Queue> {
        self.record(Call::Register);
        let n = self.registered.fetch_add(1, Ordering::SeqCst) + 1;
        self.registrations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(queue(&format!("q-{n}"), -1)))
    }

    async fn get_events(&self, queue: &Queue) -> Result<EventBatch> {
        self.record(Call::GetEvents(queue.clone()));
        let next = self.fetches.lock().unwrap().pop_front();
        if let Some(result) = next {
            return result;
        }

        let newer: Vec<Queued> = self
            .queued
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.id() > queue.last_event_id)
            .cloned()
            .collect();
        let Some(last_event_id) = newer.iter().map(Queued::id).max() else {
            // Idle long-poll: yield before reporting a heartbeat.
            self.drained.cancel();
            tokio::time::sleep(Duration::from_millis(5)).await;
            return Err(ApiError::Heartbeat {
                last_event_id: queue.last_event_id,
            });
        };
        tokio::task::yield_now().await;
        if newer.iter().all(|event| matches!(event, Queued::Heartbeat(_))) {
            return Err(ApiError::Heartbeat { last_event_id });
        }
        let messages = newer
            .into_iter()
            .filter_map(|event| match event {
                Queued::Message(message) => Some(message),
                _ => None,
            })
            .collect();
        Ok(EventBatch {
            messages,
            last_event_id: Some(last_event_id),
        })
    }

    async fn get_streams(&self) -> Result<Vec<Stream>> {
        self.record(Call::GetStreams);
        // Let concurrent lookups run while the listing is in flight.
        tokio::task::yield_now().await;
        let mut failures = self.stream_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ApiError::Http("connection refused".to_string()));
        }
        Ok(self.directory.lock().unwrap().clone())
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<String> {
        self.record(Call::Send(message.clone()));
        let scripted = self.send_bodies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
            Ok(format!(r#"{{"id":{id},"msg":"","result":"success"}}"#))
        })
    }

    async fn update_message(&self, message_id: &str, content: &str) -> Result<()> {
        self.record(Call::Update {
            id: message_id.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }
}

pub(crate) fn queue(queue_id: &str, last_event_id: i64) -> Queue {
    Queue {
        queue_id: queue_id.to_string(),
        last_event_id,
    }
}

pub(crate) fn stream(stream_id: i64, name: &str) -> Stream {
    Stream {
        stream_id,
        name: name.to_string(),
    }
}

pub(crate) fn event(
    id: i64,
    sender_email: &str,
    sender_id: i64,
    stream_id: i64,
    content: &str,
) -> MessageEvent {
    let name = sender_email.split('@').next().unwrap_or_default();
    MessageEvent {
        id,
        message: ZulipMessage {
            id: id * 100,
            sender_email: sender_email.to_string(),
            sender_id,
            sender_full_name: name.to_string(),
            avatar_url: Some(format!("https://chat.example.com/avatar/{sender_id}")),
            stream_id: Some(stream_id),
            content: content.to_string(),
            kind: "stream".to_string(),
            subject: "standup".to_string(),
        },
    }
}
