use std::sync::Arc;

use aggrmux_frame::{Frame, FrameError, FrameReader, MessageType};
use aggrmux_transport::AggrStream;
use tracing::debug;

use crate::response::Response;
use crate::shared::Shared;

/// Reads response frames and routes each to the call its slot and salt name.
pub(crate) struct ReceiveLoop {
    shared: Arc<Shared>,
    reader: FrameReader<AggrStream>,
}

impl ReceiveLoop {
    pub(crate) fn new(shared: Arc<Shared>, reader: FrameReader<AggrStream>) -> Self {
        Self { shared, reader }
    }

    pub(crate) fn run(mut self) {
        debug!("receiver started");
        while !self.shared.is_shut_down() {
            match self.reader.read_frame() {
                Ok(frame) => self.route(frame),
                Err(err) if err.is_timeout() => continue,
                Err(err) => {
                    if !self.shared.is_shut_down() {
                        self.report(err);
                    }
                    break;
                }
            }
        }
        debug!("receiver stopped");
    }

    fn route(&self, frame: Frame) {
        let shared = &self.shared;
        let header = frame.header;

        if header.msg_type != MessageType::Data {
            debug!(
                msg_type = header.msg_type.name(),
                "ignoring control frame on established connection"
            );
            return;
        }

        shared.connection.record_received();
        match shared.pool.complete(header.slot, header.salt) {
            Some(continuation) => {
                shared.deliver(continuation, Response::Payload(frame.payload));
                shared.pool.release(header.slot);
            }
            None => debug!(
                slot = header.slot,
                salt = header.salt,
                "dropping response with no matching call"
            ),
        }
    }

    fn report(&self, err: FrameError) {
        match err {
            FrameError::ConnectionClosed => self
                .shared
                .fail_connection(&"aggregation endpoint closed the connection"),
            err => self.shared.fail_connection(&err),
        }
    }
}
