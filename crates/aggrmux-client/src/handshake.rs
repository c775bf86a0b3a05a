use std::io::{Read, Write};
use std::time::{Duration, Instant};

use aggrmux_frame::{FrameError, FrameHeader, FrameReader, FrameWriter, MessageType};

use crate::error::{ClientError, Result};

/// Client side: announce `port` with a zero-payload CREATE_SOCKET header and
/// return the server's reply, which becomes the template for every DATA frame.
pub fn handshake_client<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    port: u16,
    timeout: Duration,
) -> Result<FrameHeader> {
    writer.send(&FrameHeader::create_socket(port), &[])?;

    let deadline = Instant::now() + timeout;
    let template = recv_create_socket(reader, deadline, timeout)?;
    tracing::debug!(
        connection_id = template.connection_id,
        socket_index = template.socket_index,
        port = template.port,
        "aggregation socket created"
    );
    Ok(template)
}

/// Server side: accept a CREATE_SOCKET request and answer with the template
/// the client must copy into its DATA frames.
pub fn handshake_server<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    connection_id: u64,
    socket_index: u32,
    timeout: Duration,
) -> Result<FrameHeader> {
    let deadline = Instant::now() + timeout;
    let request = recv_create_socket(reader, deadline, timeout)?;

    let template = FrameHeader {
        connection_id,
        socket_index,
        ..FrameHeader::create_socket(request.port)
    };
    writer.send(&template, &[])?;
    Ok(template)
}

fn recv_create_socket<R: Read>(
    reader: &mut FrameReader<R>,
    deadline: Instant,
    timeout: Duration,
) -> Result<FrameHeader> {
    loop {
        if Instant::now() >= deadline {
            return Err(ClientError::Timeout(timeout));
        }

        match reader.read_frame() {
            Ok(frame) => {
                if frame.header.msg_type != MessageType::CreateSocket {
                    return Err(ClientError::Handshake(format!(
                        "expected {}, got {}",
                        MessageType::CreateSocket.name(),
                        frame.header.msg_type.name()
                    )));
                }
                if !frame.payload.is_empty() {
                    return Err(ClientError::Handshake(format!(
                        "unexpected {}-byte handshake payload",
                        frame.payload.len()
                    )));
                }
                return Ok(frame.header);
            }
            Err(err) if err.is_timeout() => continue,
            Err(FrameError::ConnectionClosed) => {
                return Err(ClientError::Disconnected(
                    "connection closed during handshake".to_string(),
                ));
            }
            Err(err) => return Err(ClientError::Frame(err)),
        }
    }
}
