use crate::error::{ApiError, Result};
use crate::traits::ZulipApi;
use crate::types::{EventBatch, MessageEvent, OutgoingMessage, Queue, Stream, ZulipMessage};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const ZULIP_API_PREFIX: &str = "/api/v1/";
const ZULIP_EVENT_TYPES: &str = r#"["message"]"#;
const ZULIP_BAD_EVENT_QUEUE_CODE: &str = "BAD_EVENT_QUEUE_ID";
const ZULIP_RATE_LIMIT_CODE: &str = "RATE_LIMIT_HIT";
const ZULIP_AUTH_CODES: &[&str] = &["UNAUTHORIZED", "INVALID_API_KEY", "USER_DEACTIVATED"];
// Zulip answers an idle long-poll with a heartbeat after roughly 90 seconds.
const ZULIP_DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct ZulipClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    api_key: String,
}

impl ZulipClient {
    pub fn new(server: &str, email: &str, api_key: &str) -> Result<Self> {
        let server = normalize_server_url(server)?;
        let email = email.trim();
        if email.is_empty() {
            return Err(ApiError::InvalidInput(
                "zulip login email is required".to_string(),
            ));
        }
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ApiError::InvalidInput("zulip api key is required".to_string()));
        }
        Ok(Self {
            http: build_http(ZULIP_DEFAULT_TIMEOUT)?,
            base_url: format!("{server}{ZULIP_API_PREFIX}"),
            email: email.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Overall request timeout. Must stay above the server's heartbeat
    /// interval or idle long-polls will fail as HTTP errors.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_http(timeout)?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    fn api_url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ApiError::InvalidInput(format!("invalid zulip API URL path {path:?}: {e}")))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<String> {
        let response = request
            .basic_auth(&self.email, Some(&self.api_key))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }
        Ok(body)
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.execute(request).await?;
        decode_success(&body)
    }
}

#[async_trait::async_trait]
impl ZulipApi for ZulipClient {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn register_queue(&self) -> Result<Queue> {
        let url = self.api_url("register")?;
        let request = self.http.post(url).form(&[
            ("event_types", ZULIP_EVENT_TYPES),
            ("apply_markdown", "false"),
        ]);
        let registered: RegisterResponse = self.execute_json(request).await?;
        tracing::debug!(
            queue_id = %registered.queue_id,
            last_event_id = registered.last_event_id,
            "zulip event queue registered"
        );
        Ok(Queue {
            queue_id: registered.queue_id,
            last_event_id: registered.last_event_id,
        })
    }

    async fn get_events(&self, queue: &Queue) -> Result<EventBatch> {
        let url = self.api_url("events")?;
        let last_event_id = queue.last_event_id.to_string();
        let request = self.http.get(url).query(&[
            ("queue_id", queue.queue_id.as_str()),
            ("last_event_id", last_event_id.as_str()),
        ]);
        let parsed: EventsResponse = self.execute_json(request).await?;
        collect_message_events(parsed.events)
    }

    async fn get_streams(&self) -> Result<Vec<Stream>> {
        let url = self.api_url("streams")?;
        let parsed: StreamsResponse = self.execute_json(self.http.get(url)).await?;
        Ok(parsed.streams)
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<String> {
        if message.stream.trim().is_empty() {
            return Err(ApiError::InvalidInput(
                "zulip stream name is required".to_string(),
            ));
        }
        let url = self.api_url("messages")?;
        let request = self.http.post(url).form(&[
            ("type", "stream"),
            ("to", message.stream.as_str()),
            ("topic", message.topic.as_str()),
            ("content", message.content.as_str()),
        ]);
        self.execute(request).await
    }

    async fn update_message(&self, message_id: &str, content: &str) -> Result<()> {
        let message_id = message_id.trim();
        if message_id.is_empty() {
            return Err(ApiError::InvalidInput(
                "zulip message id is required".to_string(),
            ));
        }
        let url = self.api_url(&format!("messages/{message_id}"))?;
        let request = self.http.patch(url).form(&[("content", content)]);
        let body = self.execute(request).await?;
        let _: serde_json::Value = decode_success(&body)?;
        Ok(())
    }
}

fn build_http(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

fn normalize_server_url(raw: &str) -> Result<String> {
    let normalized = raw.trim().trim_end_matches('/').to_string();
    if normalized.is_empty() {
        return Err(ApiError::InvalidInput(
            "zulip server URL is required".to_string(),
        ));
    }
    let parsed = Url::parse(&normalized)
        .map_err(|e| ApiError::InvalidInput(format!("invalid zulip server URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(normalized),
        other => Err(ApiError::InvalidInput(format!(
            "invalid zulip server URL scheme: {other} (expected http or https)"
        ))),
    }
}

fn decode_success<T: DeserializeOwned>(body: &str) -> Result<T> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ApiError::MalformedResponse(format!("response was not JSON: {e}")))?;
    if value.get("result").and_then(serde_json::Value::as_str) == Some("error") {
        let error: ErrorBody = serde_json::from_value(value)?;
        return Err(classify_error_body(StatusCode::OK, error));
    }
    Ok(serde_json::from_value(value)?)
}

fn classify_failure(status: StatusCode, body: &str) -> ApiError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ApiError::Backoff;
    }
    let parsed = serde_json::from_str::<ErrorBody>(body);
    if status == StatusCode::UNAUTHORIZED {
        let msg = parsed
            .map(|error| error.msg)
            .unwrap_or_else(|_| format!("status={status}"));
        return ApiError::Auth(msg);
    }
    match parsed {
        Ok(error) => classify_error_body(status, error),
        Err(_) if status.is_server_error() => ApiError::Unavailable(format!("status={status}")),
        Err(e) => ApiError::MalformedResponse(format!("status={status} body was not JSON: {e}")),
    }
}

fn classify_error_body(status: StatusCode, error: ErrorBody) -> ApiError {
    match error.code.as_deref() {
        Some(ZULIP_BAD_EVENT_QUEUE_CODE) => ApiError::BadEventQueue(error.msg),
        Some(ZULIP_RATE_LIMIT_CODE) => ApiError::Backoff,
        Some(code) if ZULIP_AUTH_CODES.contains(&code) => ApiError::Auth(error.msg),
        _ if status.is_server_error() => {
            ApiError::Unavailable(format!("status={status} msg={}", error.msg))
        }
        code => ApiError::Api {
            code: code.unwrap_or("UNKNOWN").to_string(),
            msg: error.msg,
        },
    }
}

fn collect_message_events(events: Vec<RawEvent>) -> Result<EventBatch> {
    let total = events.len();
    let last_event_id = events.iter().map(|event| event.id).max();
    let mut heartbeats = 0usize;
    let mut messages = Vec::new();
    for event in events {
        match (event.kind.as_str(), event.message) {
            ("heartbeat", _) => heartbeats += 1,
            ("message", Some(message)) => messages.push(MessageEvent {
                id: event.id,
                message,
            }),
            ("message", None) => {
                tracing::warn!(event_id = event.id, "zulip message event without payload");
            }
            (other, _) => {
                tracing::debug!(event_id = event.id, kind = other, "ignoring zulip event");
            }
        }
    }
    if let Some(last_event_id) = last_event_id.filter(|_| heartbeats == total) {
        return Err(ApiError::Heartbeat { last_event_id });
    }
    Ok(EventBatch {
        messages,
        last_event_id,
    })
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    queue_id: String,
    last_event_id: i64,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<ZulipMessage>,
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    streams: Vec<Stream>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    msg: String,
}
