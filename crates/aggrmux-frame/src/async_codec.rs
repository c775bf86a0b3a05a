//! `tokio_util::codec` adapter for aggregation frames (requires `async` feature).

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Frame codec for use with `tokio_util::codec::Framed`.
#[derive(Debug, Clone)]
pub struct AggrCodec {
    max_payload: usize,
}

impl AggrCodec {
    /// Create a codec with the default 4 MiB buffer ceiling.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    /// Create a codec honouring the configured buffer ceiling.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            max_payload: config.max_payload(),
        }
    }
}

impl Default for AggrCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AggrCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.max_payload)
    }
}

impl Encoder<Frame> for AggrCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: item.payload.len(),
                max: self.max_payload,
            });
        }
        encode_frame(&item.header, item.payload.as_ref(), dst)
    }
}
