use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::AggrStream;

/// Default kernel send/receive buffer size: 512 KiB.
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 1 << 19;

/// Socket tuning applied right after a connection is established.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Disable Nagle's algorithm. Default: true.
    pub nodelay: bool,
    /// Kernel send/receive buffer size. `None` keeps the OS default.
    pub buffer_size: Option<usize>,
    /// Read timeout for blocking reads.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking writes.
    pub write_timeout: Option<Duration>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            buffer_size: Some(DEFAULT_SOCKET_BUFFER_SIZE),
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl SocketOptions {
    /// Apply these options to a connected stream.
    pub fn apply(&self, stream: &AggrStream) -> Result<()> {
        stream.set_nodelay(self.nodelay)?;
        if let Some(size) = self.buffer_size {
            stream.set_socket_buffers(size)?;
        }
        stream.set_read_timeout(self.read_timeout)?;
        stream.set_write_timeout(self.write_timeout)?;
        Ok(())
    }
}

/// Connect to `host:port` (blocking), trying every resolved address in order.
pub fn connect(host: &str, port: u16, options: &SocketOptions) -> Result<AggrStream> {
    let addr = format!("{host}:{port}");
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Connect {
            addr: addr.clone(),
            source,
        })?
        .collect();

    if candidates.is_empty() {
        return Err(TransportError::Unresolved(addr));
    }

    let mut last_err = None;
    for candidate in candidates {
        match TcpStream::connect(candidate) {
            Ok(tcp) => {
                let stream = AggrStream::from_tcp(tcp);
                options.apply(&stream)?;
                debug!(%candidate, "connected to aggregation endpoint");
                return Ok(stream);
            }
            Err(err) => {
                debug!(%candidate, error = %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(TransportError::Connect {
        addr,
        source: last_err
            .unwrap_or_else(|| std::io::Error::other("no address could be connected")),
    })
}

/// TCP listener handing out [`AggrStream`] connections.
pub struct AggrListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl AggrListener {
    /// Bind and listen on `addr` (e.g. `127.0.0.1:9191`, or port 0 for ephemeral).
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        info!(%local_addr, "listening for aggregation connections");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<AggrStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok(AggrStream::from_tcp(stream))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
