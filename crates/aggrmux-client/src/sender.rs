use std::sync::Arc;

use aggrmux_frame::{FrameHeader, FrameWriter};
use aggrmux_transport::AggrStream;
use crossbeam_channel::select;
use tracing::{debug, trace};

use crate::error::Result;
use crate::response::Unavailable;
use crate::shared::Shared;
use crate::slots::PendingCall;

/// Drains the send queue into batched writes.
///
/// Each wake-up takes every call queued at that moment, assigns it a fresh
/// salt, moves its slot to in-flight and appends its frame; the batch goes
/// out in one write (or earlier, whenever the buffer would overflow).
pub(crate) struct SendLoop {
    shared: Arc<Shared>,
    writer: FrameWriter<AggrStream>,
}

impl SendLoop {
    pub(crate) fn new(shared: Arc<Shared>, writer: FrameWriter<AggrStream>) -> Self {
        Self { shared, writer }
    }

    pub(crate) fn run(mut self) {
        debug!("sender started");
        loop {
            if self.shared.is_shut_down() {
                break;
            }
            let first = select! {
                recv(self.shared.send_rx) -> call => match call {
                    Ok(call) => call,
                    Err(_) => break,
                },
                recv(self.shared.shutdown_rx) -> _ => break,
            };

            if self.shared.connection.is_broken() {
                self.fail_queued(first);
                continue;
            }
            if let Err(err) = self.send_batch(first) {
                if self.shared.is_shut_down() {
                    debug!(error = %err, "write interrupted by shutdown");
                    break;
                }
                self.shared.fail_connection(&err);
            }
        }
        debug!("sender stopped");
    }

    fn send_batch(&mut self, first: PendingCall) -> Result<()> {
        let mut staged = 0u64;
        let mut next = Some(first);
        while let Some(call) = next {
            self.stage(call)?;
            staged += 1;
            next = self.shared.send_rx.try_recv().ok();
        }

        let flushed = self.writer.flush()?;
        trace!(staged, flushed, "batch written");
        Ok(())
    }

    fn stage(&mut self, call: PendingCall) -> Result<()> {
        let shared = &self.shared;
        let salt = shared.pool.next_salt();
        let header = FrameHeader::data_from(
            shared.connection.template(),
            call.slot,
            salt,
            call.request.len() as u32,
        );

        // The slot must be in flight before its frame can reach the wire.
        shared
            .pool
            .occupy(call.slot, salt, call.created, call.continuation);
        self.writer.push(&header, &call.request)?;
        shared.connection.record_sent(1);
        Ok(())
    }

    fn fail_queued(&self, first: PendingCall) {
        let shared = &self.shared;
        let mut failed = 1usize;
        shared.fail_pending(first, Unavailable::ConnectionLost);
        for call in shared.send_rx.try_iter() {
            shared.fail_pending(call, Unavailable::ConnectionLost);
            failed += 1;
        }
        debug!(calls = failed, "failed queued calls on broken connection");
    }
}
