//! Aggregation framing: many request/response messages over one TCP stream.
//!
//! Every message is framed with a fixed 24-byte little-endian header:
//! - connection identity and socket index, copied from the handshake template
//! - payload length
//! - correlation slot and salt
//! - logical port, message type and flags
//!
//! [`FrameReader`] reassembles frames across arbitrary read boundaries and
//! [`FrameWriter`] batches many frames into one write.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::AggrCodec;
pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, FrameHeader, DEFAULT_BUFFER_SIZE,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use message::MessageType;
pub use reader::FrameReader;
pub use writer::FrameWriter;
