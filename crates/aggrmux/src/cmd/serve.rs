use aggrmux_frame::{AggrCodec, Frame, FrameError, FrameHeader, MessageType};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{io_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime start failed", err))?;
    runtime.block_on(serve(args))
}

async fn serve(args: ServeArgs) -> CliResult<i32> {
    let listener = TcpListener::bind(&args.addr)
        .await
        .map_err(|err| io_error(&format!("bind {} failed", args.addr), err))?;
    let local = listener
        .local_addr()
        .map_err(|err| io_error("local address unavailable", err))?;
    info!(addr = %local, silent = args.silent, "aggregation server listening");

    let silent = args.silent;
    let mut next_id = 1u64;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let connection_id = next_id;
                    next_id += 1;
                    debug!(%peer, connection_id, "accepted connection");
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, connection_id, silent).await {
                            warn!(connection_id, error = %err, "connection failed");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "accept failed"),
            },
            _ = &mut shutdown => {
                info!("interrupted, shutting down");
                return Ok(SUCCESS);
            }
        }
    }
}

/// Serve one aggregation connection: answer CREATE_SOCKET with a template,
/// echo DATA frames verbatim (or swallow them when silent).
async fn handle_connection(
    stream: TcpStream,
    connection_id: u64,
    silent: bool,
) -> Result<(), FrameError> {
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, AggrCodec::new());
    let mut echoed = 0u64;

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        match frame.header.msg_type {
            MessageType::CreateSocket => {
                let template = template_for(connection_id, &frame.header);
                framed.send(Frame::new(template, Bytes::new())).await?;
                info!(connection_id, port = template.port, "socket created");
            }
            MessageType::DestroySocket => {
                debug!(connection_id, "socket destroyed");
            }
            MessageType::Data if silent => {
                debug!(connection_id, slot = frame.header.slot, "swallowing request");
            }
            MessageType::Data => {
                framed.send(frame).await?;
                echoed += 1;
            }
        }
    }

    info!(connection_id, echoed, "connection closed");
    Ok(())
}

fn template_for(connection_id: u64, request: &FrameHeader) -> FrameHeader {
    FrameHeader {
        connection_id,
        socket_index: connection_id as u32,
        ..FrameHeader::create_socket(request.port)
    }
}
