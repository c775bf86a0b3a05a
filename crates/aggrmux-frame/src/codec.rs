use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::MessageType;

/// Frame header size in bytes.
pub const HEADER_SIZE: usize = 24;

/// Default send/receive buffer ceiling: 4 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Largest payload that fits a default-sized buffer together with its header.
pub const DEFAULT_MAX_PAYLOAD: usize = DEFAULT_BUFFER_SIZE - HEADER_SIZE;

/// Fixed 24-byte header in front of every multiplexed message.
///
/// `connection_id`, `socket_index` and `port` come from the template the
/// server returns during the handshake; the client only ever fills in
/// `payload_len`, `slot`, `salt`, `msg_type` and `flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Server-assigned connection identity.
    pub connection_id: u64,
    /// Number of payload bytes following the header.
    pub payload_len: u32,
    /// Server-assigned socket bookkeeping index.
    pub socket_index: u32,
    /// Correlation slot of the call this frame belongs to.
    pub slot: u16,
    /// Correlation salt; zero means "no call".
    pub salt: u16,
    /// Logical data port on the server.
    pub port: u16,
    /// Message type.
    pub msg_type: MessageType,
    /// Reserved flags.
    pub flags: u8,
}

impl FrameHeader {
    /// Locally-seeded handshake header: zero-payload CREATE_SOCKET for `port`.
    pub fn create_socket(port: u16) -> Self {
        Self {
            port,
            msg_type: MessageType::CreateSocket,
            ..Self::default()
        }
    }

    /// Derive a DATA header from a connection template.
    pub fn data_from(template: &FrameHeader, slot: u16, salt: u16, payload_len: u32) -> Self {
        Self {
            payload_len,
            slot,
            salt,
            msg_type: MessageType::Data,
            flags: 0,
            ..*template
        }
    }

    /// Write the header in wire format.
    ///
    /// Wire format (little-endian):
    /// ```text
    /// ┌───────────────┬────────────┬──────────────┬──────────┬──────────┬──────────┬──────┬───────┐
    /// │ connection_id │ payload_len│ socket_index │ slot     │ salt     │ port     │ type │ flags │
    /// │ (8B)          │ (4B)       │ (4B)         │ (2B)     │ (2B)     │ (2B)     │ (1B) │ (1B)  │
    /// └───────────────┴────────────┴──────────────┴──────────┴──────────┴──────────┴──────┴───────┘
    /// ```
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u64_le(self.connection_id);
        dst.put_u32_le(self.payload_len);
        dst.put_u32_le(self.socket_index);
        dst.put_u16_le(self.slot);
        dst.put_u16_le(self.salt);
        dst.put_u16_le(self.port);
        dst.put_u8(self.msg_type.into());
        dst.put_u8(self.flags);
    }

    /// Parse a header from the first [`HEADER_SIZE`] bytes of `src`.
    ///
    /// Returns `Ok(None)` if fewer than `HEADER_SIZE` bytes are available.
    pub fn decode(src: &[u8]) -> Result<Option<Self>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut cur = &src[..HEADER_SIZE];
        let connection_id = cur.get_u64_le();
        let payload_len = cur.get_u32_le();
        let socket_index = cur.get_u32_le();
        let slot = cur.get_u16_le();
        let salt = cur.get_u16_le();
        let port = cur.get_u16_le();
        let msg_type = MessageType::try_from(cur.get_u8())?;
        let flags = cur.get_u8();

        Ok(Some(Self {
            connection_id,
            payload_len,
            socket_index,
            slot,
            salt,
            port,
            msg_type,
            flags,
        }))
    }

    /// Total wire size of the frame this header announces.
    pub fn frame_size(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize
    }
}

/// A decoded frame: header plus its payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, fixing up `payload_len` to match the payload.
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        header.payload_len = payload.len() as u32;
        Self { header, payload }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// `header.payload_len` is ignored and replaced with `payload.len()`.
pub fn encode_frame(header: &FrameHeader, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let payload_len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    FrameHeader {
        payload_len,
        ..*header
    }
    .encode(dst);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let header = match FrameHeader::decode(&src[..])? {
        Some(header) => header,
        None => return Ok(None), // Need more data
    };

    let payload_len = header.payload_len as usize;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { header, payload }))
}

/// Configuration for frame reading and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Buffer ceiling in bytes; one frame (header + payload) must fit. Default: 4 MiB.
    pub buffer_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl FrameConfig {
    /// Largest payload a single frame may carry under this configuration.
    pub fn max_payload(&self) -> usize {
        self.buffer_size.saturating_sub(HEADER_SIZE)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
