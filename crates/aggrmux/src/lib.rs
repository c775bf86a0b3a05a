//! Request aggregation over a single TCP connection.
//!
//! aggrmux multiplexes many independent request/response calls onto one
//! connection to an aggregation endpoint, correlating responses by slot and
//! salt.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP connect/accept and socket tuning
//! - [`frame`]: 24-byte header framing, batching writer, reassembling reader
//! - [`client`]: the multiplexer itself (behind the default `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use aggrmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use aggrmux_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use aggrmux_client::*;
}
