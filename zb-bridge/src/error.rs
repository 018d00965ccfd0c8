use thiserror::Error;
use zb_api::ApiError;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("zulip api: {0}")]
    Api(#[from] ApiError),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("bus inbound channel closed")]
    BusClosed,

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("adapter is already connected")]
    AlreadyConnected,
}
