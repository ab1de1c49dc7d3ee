//! A TCP connection handle shared by both pumps of a session

use futures::{Async, Poll};
use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A cloneable handle to one TCP connection. One pump reads from it while the
/// other writes to it, and either may close it. The lock is only held for
/// the duration of a single non-blocking read, write or shutdown.
#[derive(Debug, Clone)]
pub struct SharedStream(Arc<Mutex<TcpStream>>);

impl SharedStream {
    /// Wrap the given stream
    pub fn new(stream: TcpStream) -> Self {
        SharedStream(Arc::new(Mutex::new(stream)))
    }

    fn lock(&self) -> IoResult<MutexGuard<'_, TcpStream>> {
        self.0
            .lock()
            .map_err(|_| IoError::new(ErrorKind::Other, "stream lock poisoned"))
    }

    /// Get the address of the remote end of this connection
    pub fn peer_addr(&self) -> IoResult<SocketAddr> {
        self.lock()?.peer_addr()
    }

    /// Shut down both halves of the connection. Any task blocked reading from
    /// this connection observes end of stream, and further writes fail.
    /// Closing an already disconnected stream is not an error.
    pub fn close(&self) -> IoResult<()> {
        match self.lock()?.shutdown(Shutdown::Both) {
            Err(ref e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            res => res,
        }
    }
}

impl Read for SharedStream {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.lock()?.read(buf)
    }
}

impl Write for SharedStream {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.lock()?.flush()
    }
}

impl AsyncRead for SharedStream {}

impl AsyncWrite for SharedStream {
    fn shutdown(&mut self) -> Poll<(), IoError> {
        self.lock()?.shutdown(Shutdown::Write)?;
        Ok(Async::Ready(()))
    }
}
