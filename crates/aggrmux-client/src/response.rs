use std::fmt;

use bytes::Bytes;

/// HTTP status reported for calls that never got a real response.
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// Why a call was resolved without a server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// No response arrived within the receive timeout.
    TimedOut,
    /// The aggregation connection failed while the call was outstanding.
    ConnectionLost,
    /// The client shut down before the call resolved.
    ShutDown,
}

impl Unavailable {
    /// Human-readable reason, suitable for a 503 body.
    pub fn reason(self) -> &'static str {
        match self {
            Self::TimedOut => "time for the response is exceeded",
            Self::ConnectionLost => "aggregation connection lost",
            Self::ShutDown => "aggregation client shut down",
        }
    }
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service unavailable: {}", self.reason())
    }
}

/// The single outcome delivered to a call's continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Raw response bytes from the server, unparsed.
    Payload(Bytes),
    /// Synthesized failure; see [`Response::status_code`].
    Unavailable(Unavailable),
}

impl Response {
    /// True if the server actually answered.
    pub fn is_payload(&self) -> bool {
        matches!(self, Self::Payload(_))
    }

    /// Response bytes, if the server answered.
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            Self::Payload(bytes) => Some(bytes),
            Self::Unavailable(_) => None,
        }
    }

    /// Consume the response, keeping only server bytes.
    pub fn into_payload(self) -> Option<Bytes> {
        match self {
            Self::Payload(bytes) => Some(bytes),
            Self::Unavailable(_) => None,
        }
    }

    /// Status code of a synthesized response. Payload responses are not parsed
    /// and report `None`.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Payload(_) => None,
            Self::Unavailable(_) => Some(SERVICE_UNAVAILABLE),
        }
    }
}

/// Completion callback for one call. Runs exactly once, on the dispatch thread.
pub(crate) type Continuation = Box<dyn FnOnce(Response) + Send + 'static>;
