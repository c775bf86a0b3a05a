use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected aggregation stream. Implements `Read` and `Write`.
///
/// Wraps one TCP connection. The multiplexer clones it once so the sender
/// and receiver loops each own a handle to the same socket.
pub struct AggrStream {
    inner: TcpStream,
}

impl Read for AggrStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for AggrStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl AggrStream {
    /// Wrap an already connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self { inner: stream }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Enable or disable Nagle's algorithm.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_tcp(cloned))
    }

    /// Shut down both directions of the connection.
    ///
    /// Any thread blocked in a read on a clone of this stream wakes up with
    /// EOF or an error. Errors from an already closed socket are ignored.
    pub fn shutdown(&self) {
        if let Err(err) = self.inner.shutdown(Shutdown::Both) {
            tracing::debug!(error = %err, "stream shutdown failed");
        }
    }

    /// Shut down the write direction only.
    ///
    /// A thread blocked writing on a clone of this stream fails with
    /// `BrokenPipe`; reads keep working until the peer closes.
    pub fn shutdown_write(&self) {
        if let Err(err) = self.inner.shutdown(Shutdown::Write) {
            tracing::debug!(error = %err, "stream write shutdown failed");
        }
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }

    /// Address of the local end.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }

    /// Set kernel send/receive buffer sizes (`SO_SNDBUF` / `SO_RCVBUF`).
    #[cfg(unix)]
    pub fn set_socket_buffers(&self, size: usize) -> Result<()> {
        use std::os::fd::AsRawFd;

        let fd = self.inner.as_raw_fd();
        let value = libc::c_int::try_from(size).unwrap_or(libc::c_int::MAX);

        for option in [libc::SO_SNDBUF, libc::SO_RCVBUF] {
            // SAFETY: `value` lives for the duration of the call and its size is
            // passed alongside; `fd` is an open TCP socket owned by this stream.
            let rc = unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    option,
                    (&value as *const libc::c_int).cast::<libc::c_void>(),
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            };
            if rc != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
        }
        Ok(())
    }

    /// Set kernel send/receive buffer sizes.
    ///
    /// No-op on platforms without a portable `setsockopt`.
    #[cfg(not(unix))]
    pub fn set_socket_buffers(&self, size: usize) -> Result<()> {
        tracing::debug!(size, "socket buffer sizing unsupported on this platform");
        Ok(())
    }
}

impl std::fmt::Debug for AggrStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggrStream")
            .field("peer", &self.inner.peer_addr().ok())
            .finish()
    }
}
