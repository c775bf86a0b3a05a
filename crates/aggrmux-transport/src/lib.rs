//! TCP transport for the aggregation multiplexer.
//!
//! This is the lowest layer of aggrmux. It owns socket setup (connect,
//! accept, buffer sizes, no-delay, timeouts) and hands out [`AggrStream`]
//! values that the framing and client layers read from and write to.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::AggrStream;
pub use tcp::{connect, AggrListener, SocketOptions, DEFAULT_SOCKET_BUFFER_SIZE};
