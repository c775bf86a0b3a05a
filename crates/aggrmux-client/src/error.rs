/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] aggrmux_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] aggrmux_frame::FrameError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The aggregation connection is gone; no new calls are accepted.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Request can never fit the send buffer.
    #[error("request too large ({size} bytes, max {max})")]
    RequestTooLarge { size: usize, max: usize },

    /// HTTP request fields that cannot be serialized safely.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Load adjustments must be a multiple of 10 between 10 and 90 percent.
    #[error("load percentage must be a multiple of 10 in 10..=90, got {0}")]
    InvalidLoadPercent(u32),

    /// Handshake did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The client has been shut down.
    #[error("client is shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, ClientError>;
