use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use aggrmux_frame::{FrameHeader, FrameReader, FrameWriter};
use aggrmux_transport::{connect, AggrStream};
use tracing::info;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::handshake::handshake_client;

/// The one aggregation connection: socket handle, handshake template and
/// wire counters.
pub(crate) struct Connection {
    stream: AggrStream,
    template: FrameHeader,
    broken: AtomicBool,
    sent: AtomicU64,
    received: AtomicU64,
}

/// Read and write halves handed to the receiver and sender loops.
pub(crate) type Halves = (FrameReader<AggrStream>, FrameWriter<AggrStream>);

impl Connection {
    /// Connect, perform the CREATE_SOCKET handshake and switch the read side
    /// to the receiver poll interval.
    pub(crate) fn open(config: &ClientConfig) -> Result<(Self, Halves)> {
        let stream = connect(
            &config.host,
            config.aggregation_port,
            &config.socket_options(),
        )?;

        let mut reader = FrameReader::with_config(stream.try_clone()?, config.recv_frame_config());
        let mut writer = FrameWriter::with_config(stream.try_clone()?, config.send_frame_config());
        let template = handshake_client(
            &mut reader,
            &mut writer,
            config.data_port,
            config.handshake_timeout,
        )?;
        reader.get_ref().set_read_timeout(Some(config.poll_interval))?;

        info!(
            endpoint = %config.endpoint(),
            data_port = config.data_port,
            connection_id = template.connection_id,
            "aggregation connection established"
        );

        Ok((Self::detached(stream, template), (reader, writer)))
    }

    /// Wrap an already handshaken stream.
    pub(crate) fn detached(stream: AggrStream, template: FrameHeader) -> Self {
        Self {
            stream,
            template,
            broken: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        }
    }

    pub(crate) fn template(&self) -> &FrameHeader {
        &self.template
    }

    pub(crate) fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Mark the connection broken. Returns true for the first caller only.
    pub(crate) fn mark_broken(&self) -> bool {
        !self.broken.swap(true, Ordering::AcqRel)
    }

    /// Shut the socket down in both directions, waking a blocked reader.
    pub(crate) fn close(&self) {
        self.stream.shutdown();
    }

    /// Shut the write side down, failing a write blocked on a peer that
    /// stopped reading.
    pub(crate) fn close_write(&self) {
        self.stream.shutdown_write();
    }

    pub(crate) fn record_sent(&self, frames: u64) {
        self.sent.fetch_add(frames, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub(crate) fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}
