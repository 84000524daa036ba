use std::time::Duration;

use thiserror::Error;

/// Failure to make sense of a single inbound frame. Never fatal to the stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has unexpected type: {value}")]
    UnexpectedType { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum StreamError {
    /// Socket or handshake failure. Terminal for the stream.
    #[error("connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to encode control message: {0}")]
    Encode(#[source] serde_json::Error),

    /// A control message needs the subscription id and none has been assigned yet.
    #[error("stream is not ready: subscription id not assigned")]
    NotReady,

    #[error("symbol `{0}` is not tracked")]
    UnknownSymbol(String),

    #[error("invalid ticker `{0}`")]
    InvalidTicker(String),

    #[error("stream did not become ready within {0:?}")]
    ReadyTimeout(Duration),

    #[error("stream closed")]
    Closed,
}

pub type StreamResult<T> = Result<T, StreamError>;
