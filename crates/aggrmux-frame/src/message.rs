//! Aggregation message types.
//!
//! Every frame header carries one of these in its `msg_type` byte. Only
//! `DATA` frames correlate with caller requests; the socket frames are
//! connection control.

use crate::error::FrameError;

/// Message type carried in byte 22 of the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MessageType {
    /// Opens the aggregated connection (handshake).
    #[default]
    CreateSocket = 0,
    /// Tears down a gateway-side socket.
    DestroySocket = 1,
    /// Carries one request or response payload.
    Data = 2,
}

impl MessageType {
    /// Human-readable name as used by the gateway.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::CreateSocket => "CREATE_SOCKET",
            MessageType::DestroySocket => "DESTROY_SOCKET",
            MessageType::Data => "DATA",
        }
    }

    /// Returns true for connection-control messages.
    pub fn is_control(self) -> bool {
        !matches!(self, MessageType::Data)
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::CreateSocket),
            1 => Ok(MessageType::DestroySocket),
            2 => Ok(MessageType::Data),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as u8
    }
}
