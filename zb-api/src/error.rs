use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Failure classes reported by the Zulip API.
///
/// The poll loop branches on these, so a new failure mode should map onto an
/// existing variant whenever the recovery action is the same.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited by server")]
    Backoff,

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("bad event queue id: {0}")]
    BadEventQueue(String),

    /// The long-poll returned only keepalives. `last_event_id` must still be
    /// acknowledged or the server will keep replaying them.
    #[error("heartbeat received (event {last_event_id})")]
    Heartbeat { last_event_id: i64 },

    #[error("api error {code}: {msg}")]
    Api { code: String, msg: String },

    #[error("http error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedResponse(e.to_string())
    }
}
