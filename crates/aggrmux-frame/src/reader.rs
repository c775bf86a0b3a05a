use std::io::{ErrorKind, Read};

use aggrmux_transport::AggrStream;
use bytes::BytesMut;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally: bytes of an incomplete trailing frame
/// stay buffered and the next read appends to them, so callers always get
/// complete frames regardless of how the stream was segmented.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(config.buffer_size),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Frames already buffered are returned without touching the stream.
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached, and
    /// `Err(FrameError::Io)` for read errors, including an elapsed read
    /// timeout (see [`FrameError::is_timeout`]); buffered bytes survive a
    /// timeout, so calling again resumes reassembly.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload())? {
                return Ok(frame);
            }

            let read = self.fill()?;
            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }
        }
    }

    /// Decode the next frame from already buffered bytes, without reading.
    pub fn next_buffered(&mut self) -> Result<Option<Frame>> {
        decode_frame(&mut self.buf, self.config.max_payload())
    }

    /// Perform one read from the stream into the tail of the buffer.
    fn fill(&mut self) -> Result<usize> {
        let start = self.buf.len();
        self.buf.resize(start + READ_CHUNK_SIZE, 0);

        let outcome = loop {
            match self.inner.read(&mut self.buf[start..]) {
                Ok(n) => break Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break Err(FrameError::Io(err)),
            }
        };

        let read = *outcome.as_ref().unwrap_or(&0);
        self.buf.truncate(start + read);
        outcome
    }

    /// Number of bytes held for a frame that is not complete yet.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<AggrStream> {
    /// Create a frame reader for `AggrStream` and apply read timeout from config.
    pub fn with_config_stream(inner: AggrStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: aggrmux_transport::TransportError) -> FrameError {
    match err {
        aggrmux_transport::TransportError::Io(io)
        | aggrmux_transport::TransportError::Accept(io) => FrameError::Io(io),
        aggrmux_transport::TransportError::Bind { source, .. }
        | aggrmux_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_frame, FrameHeader, HEADER_SIZE};
    use crate::message::MessageType;

    fn data_header(slot: u16, salt: u16) -> FrameHeader {
        FrameHeader {
            connection_id: 42,
            slot,
            salt,
            port: 8080,
            msg_type: MessageType::Data,
            ..FrameHeader::default()
        }
    }

    #[test]
    fn read_single_frame() {
        let mut wire = BytesMut::new();
        encode_frame(&data_header(1, 1), b"hello", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.header.slot, 1);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_frames_from_one_read() {
        let mut wire = BytesMut::new();
        encode_frame(&data_header(1, 10), b"one", &mut wire).unwrap();
        encode_frame(&data_header(2, 20), b"two", &mut wire).unwrap();
        encode_frame(&data_header(3, 30), b"three", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));

        let f1 = reader.read_frame().unwrap();
        // Remaining frames are already buffered.
        let f2 = reader.next_buffered().unwrap().unwrap();
        let f3 = reader.next_buffered().unwrap().unwrap();
        assert!(reader.next_buffered().unwrap().is_none());

        assert_eq!((f1.header.slot, f1.payload.as_ref()), (1, b"one".as_ref()));
        assert_eq!((f2.header.slot, f2.payload.as_ref()), (2, b"two".as_ref()));
        assert_eq!(
            (f3.header.slot, f3.payload.as_ref()),
            (3, b"three".as_ref())
        );
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![0xAB; 256 * 1024];
        let mut wire = BytesMut::new();
        encode_frame(&data_header(9, 9), &payload, &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.header.slot, 9);
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn reassembles_across_every_split_size() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut wire = BytesMut::new();
        encode_frame(&data_header(4, 7), &payload, &mut wire).unwrap();
        let wire = wire.to_vec();

        let whole = FrameReader::new(Cursor::new(wire.clone()))
            .read_frame()
            .unwrap();

        for step in [1, 2, 3, 7, 23, 24, 25, 512, wire.len() - 1, wire.len()] {
            let chunked = ChunkedReader {
                bytes: wire.clone(),
                pos: 0,
                step,
            };
            let frame = FrameReader::new(chunked).read_frame().unwrap();
            assert_eq!(frame.header, whole.header, "step {step}");
            assert_eq!(frame.payload, whole.payload, "step {step}");
        }
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        encode_frame(&data_header(2, 2), b"only-part-of-it", &mut partial).unwrap();
        partial.truncate(HEADER_SIZE + 4);

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(reader.buffered_len(), HEADER_SIZE + 4);
    }

    #[test]
    fn unknown_message_type_in_stream() {
        let mut wire = BytesMut::new();
        encode_frame(&data_header(1, 1), b"", &mut wire).unwrap();
        wire[22] = 0xFF;

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::UnknownMessageType(0xFF)));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut wire = BytesMut::new();
        FrameHeader {
            payload_len: 1024,
            ..data_header(1, 1)
        }
        .encode(&mut wire);

        let cfg = FrameConfig {
            buffer_size: HEADER_SIZE + 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn timeout_keeps_partial_bytes_and_resumes() {
        let mut wire = BytesMut::new();
        encode_frame(&data_header(5, 55), b"resume", &mut wire).unwrap();
        let wire = wire.to_vec();

        let reader = TimeoutBetweenHalves {
            first: wire[..10].to_vec(),
            second: wire[10..].to_vec(),
            state: 0,
        };
        let mut framed = FrameReader::new(reader);

        let err = framed.read_frame().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(framed.buffered_len(), 10);

        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.header.salt, 55);
        assert_eq!(frame.payload.as_ref(), b"resume");
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_frame(&data_header(8, 8), b"ok", &mut wire).unwrap();

        let reader = InterruptedThenData {
            state: 0,
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();

        assert_eq!(frame.header.slot, 8);
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = FrameReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.config().buffer_size, FrameConfig::default().buffer_size);
        let _inner = reader.into_inner();
    }

    #[test]
    fn roundtrip_over_tcp_stream() {
        let listener = aggrmux_transport::AggrListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().port();

        let server = std::thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let cfg = FrameConfig {
                read_timeout: Some(std::time::Duration::from_secs(5)),
                ..FrameConfig::default()
            };
            let mut reader = FrameReader::with_config_stream(stream, cfg).unwrap();
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame.header.slot, 11);
            assert_eq!(frame.payload.as_ref(), b"tcp");
        });

        let stream = aggrmux_transport::connect(
            "127.0.0.1",
            port,
            &aggrmux_transport::SocketOptions::default(),
        )
        .unwrap();
        let mut writer = crate::writer::FrameWriter::new(stream);
        writer.send(&data_header(11, 1), b"tcp").unwrap();

        server.join().unwrap();
    }

    struct ChunkedReader {
        bytes: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len()).min(self.step);
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct TimeoutBetweenHalves {
        first: Vec<u8>,
        second: Vec<u8>,
        state: u8,
    }

    impl Read for TimeoutBetweenHalves {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.state += 1;
            let chunk = match self.state {
                1 => &self.first,
                2 => return Err(std::io::Error::from(ErrorKind::WouldBlock)),
                3 => &self.second,
                _ => return Ok(0),
            };
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
