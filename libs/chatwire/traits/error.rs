use thiserror::Error;

/// Main error type for chatwire
#[derive(Error, Debug)]
pub enum ChatWireError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Inbound frame could not be decoded
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Queue store I/O failure
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request failed on the fallback path
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Fallback request completed with a non-success status
    #[error("Sync request rejected ({status}): {body}")]
    SyncRejected { status: u16, body: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation not valid in the current connection state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Envelope id is not tracked by the pipeline
    #[error("Unknown envelope: {0}")]
    UnknownEnvelope(String),
}

/// Result type for chatwire operations
pub type Result<T> = std::result::Result<T, ChatWireError>;
