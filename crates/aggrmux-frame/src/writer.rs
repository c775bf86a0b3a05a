use std::io::{ErrorKind, Write};

use aggrmux_transport::AggrStream;
use bytes::BytesMut;

use crate::codec::{encode_frame, Frame, FrameConfig, FrameHeader, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

/// Batches frames into one reusable buffer and writes them to any `Write` stream.
///
/// Frames are appended with [`push`](Self::push); the whole batch goes out
/// in a single `write_all` on [`flush`](Self::flush), or automatically when
/// the next frame would overflow the buffer ceiling. Frame order on the wire
/// equals push order.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    batched: usize,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(config.buffer_size),
            batched: 0,
            config,
        }
    }

    /// Returns true if a frame with `payload_len` bytes fits the current batch.
    pub fn fits(&self, payload_len: usize) -> bool {
        self.buf.len() + HEADER_SIZE + payload_len <= self.config.buffer_size
    }

    /// Check that a payload can ever be written under this configuration.
    pub fn check_payload(&self, payload_len: usize) -> Result<()> {
        if payload_len > self.config.max_payload() {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max: self.config.max_payload(),
            });
        }
        Ok(())
    }

    /// Append a frame to the batch, flushing first if it would overflow.
    ///
    /// Returns the number of frames flushed to make room (0 if none).
    pub fn push(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<usize> {
        self.check_payload(payload.len())?;

        let flushed = if self.fits(payload.len()) {
            0
        } else {
            self.flush()?
        };

        encode_frame(header, payload, &mut self.buf)?;
        self.batched += 1;
        Ok(flushed)
    }

    /// Write a complete frame immediately (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(&frame.header, frame.payload.as_ref())
    }

    /// Encode one frame and flush it together with anything already batched.
    pub fn send(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<()> {
        self.push(header, payload)?;
        self.flush()?;
        Ok(())
    }

    /// Write the batch to the stream in one go and reset the buffer.
    ///
    /// Returns the number of frames written. The buffer is cleared even on
    /// error: a failed write leaves the stream in an unknown state.
    pub fn flush(&mut self) -> Result<usize> {
        if self.buf.is_empty() {
            return Ok(0);
        }

        let frames = self.batched;
        let result = self.write_batch();
        self.buf.clear();
        self.batched = 0;
        result.map(|()| frames)
    }

    fn write_batch(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Number of frames waiting in the batch.
    pub fn batched(&self) -> usize {
        self.batched
    }

    /// Number of bytes waiting in the batch.
    pub fn batched_bytes(&self) -> usize {
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

    /// Consume the writer and return the inner stream. Unflushed frames are dropped.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<AggrStream> {
    /// Create a frame writer for `AggrStream` and apply write timeout from config.
    pub fn with_config_stream(inner: AggrStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::decode_frame;
    use crate::message::MessageType;

    fn data_header(slot: u16) -> FrameHeader {
        FrameHeader {
            connection_id: 9,
            slot,
            salt: slot + 100,
            msg_type: MessageType::Data,
            ..FrameHeader::default()
        }
    }

    fn decode_all(bytes: &[u8]) -> Vec<crate::codec::Frame> {
        let mut wire = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = decode_frame(&mut wire, usize::MAX).unwrap() {
            frames.push(frame);
        }
        assert!(wire.is_empty());
        frames
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(&data_header(1), b"hello").unwrap();

        let frames = decode_all(&writer.into_inner().into_inner());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.slot, 1);
        assert_eq!(frames[0].header.salt, 101);
        assert_eq!(frames[0].payload.as_ref(), b"hello");
    }

    #[test]
    fn batch_goes_out_in_one_write_in_push_order() {
        let mut writer = FrameWriter::new(CountingWriter::default());

        writer.push(&data_header(3), b"three").unwrap();
        writer.push(&data_header(1), b"one").unwrap();
        writer.push(&data_header(2), b"two").unwrap();
        assert_eq!(writer.batched(), 3);
        assert_eq!(writer.get_ref().writes, 0);

        assert_eq!(writer.flush().unwrap(), 3);
        assert_eq!(writer.batched(), 0);
        assert_eq!(writer.batched_bytes(), 0);

        let inner = writer.into_inner();
        assert_eq!(inner.writes, 1);
        let slots: Vec<u16> = decode_all(&inner.data)
            .iter()
            .map(|f| f.header.slot)
            .collect();
        assert_eq!(slots, vec![3, 1, 2]);
    }

    #[test]
    fn push_flushes_when_batch_would_overflow() {
        let cfg = FrameConfig {
            buffer_size: 2 * HEADER_SIZE + 10,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(CountingWriter::default(), cfg);

        assert_eq!(writer.push(&data_header(1), b"12345").unwrap(), 0);
        assert_eq!(writer.push(&data_header(2), b"12345").unwrap(), 0);
        assert!(!writer.fits(1));
        assert_eq!(writer.push(&data_header(3), b"x").unwrap(), 2);
        assert_eq!(writer.get_ref().writes, 1);

        writer.flush().unwrap();
        let inner = writer.into_inner();
        assert_eq!(inner.writes, 2);
        assert_eq!(decode_all(&inner.data).len(), 3);
    }

    #[test]
    fn frame_exactly_at_ceiling_is_accepted() {
        let cfg = FrameConfig {
            buffer_size: HEADER_SIZE + 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        writer.send(&data_header(1), b"four").unwrap();
    }

    #[test]
    fn payload_too_large_rejected() {
        let cfg = FrameConfig {
            buffer_size: HEADER_SIZE + 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.push(&data_header(1), b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 4 }));
        assert_eq!(writer.batched(), 0);
    }

    #[test]
    fn flush_on_empty_batch_is_noop() {
        let mut writer = FrameWriter::new(CountingWriter::default());
        assert_eq!(writer.flush().unwrap(), 0);
        assert_eq!(writer.into_inner().writes, 0);
    }

    #[test]
    fn write_frame_method() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let frame = Frame::new(data_header(2), "abc");

        writer.write_frame(&frame).unwrap();

        let frames = decode_all(&writer.into_inner().into_inner());
        assert_eq!(frames[0].header.slot, 2);
        assert_eq!(frames[0].payload.as_ref(), b"abc");
    }

    #[test]
    fn handles_interrupted_and_would_block_writes() {
        let mut writer = FrameWriter::new(FlakyWriter::default());
        writer.send(&data_header(5), b"retry").unwrap();

        let inner = writer.into_inner();
        assert_eq!(decode_all(&inner.data).len(), 1);
        assert!(inner.flushed);
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(&data_header(1), b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(writer.batched_bytes(), 0);
    }

    #[test]
    fn written_bytes_decode_with_reader() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(&data_header(3), b"z").unwrap();

        let wire = writer.into_inner().into_inner();
        let mut framed = crate::reader::FrameReader::new(Cursor::new(wire));
        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.header.slot, 3);
        assert_eq!(frame.payload.as_ref(), b"z");
    }

    #[derive(Default)]
    struct CountingWriter {
        writes: usize,
        data: Vec<u8>,
    }

    impl Write for CountingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.writes += 1;
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlakyWriter {
        write_calls: u8,
        flush_calls: u8,
        flushed: bool,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.write_calls += 1;
            match self.write_calls {
                1 => Err(std::io::Error::from(ErrorKind::Interrupted)),
                2 => Err(std::io::Error::from(ErrorKind::WouldBlock)),
                _ => {
                    // Short writes exercise the offset loop.
                    let n = buf.len().min(7);
                    self.data.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flush_calls += 1;
            if self.flush_calls == 1 {
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.flushed = true;
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
