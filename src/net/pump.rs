//! One direction of a relayed connection pair

use crate::inject::Splicer;
use bytes::Bytes;
use futures::{try_ready, Async, Future, Poll};
use log::{info, trace};
use std::collections::VecDeque;
use std::fmt;
use std::io::{Error as IoError, ErrorKind};
use tokio::io::{AsyncRead, AsyncWrite};

/// The size of the buffer each pump reads into
pub const BUFFER_SIZE: usize = 4096;

/// The direction a pump forwards data in
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Direction {
    /// From the client to the server
    ClientToServer,

    /// From the server to the client
    ServerToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::ClientToServer => write!(f, "client -> server"),
            Direction::ServerToClient => write!(f, "server -> client"),
        }
    }
}

/// How a pump stopped forwarding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpEnd {
    /// The source reached end of stream
    Eof,

    /// One of the connections was reset or aborted by the peer
    Reset,

    /// Some other I/O error occurred
    Failed(String),
}

impl From<IoError> for PumpEnd {
    fn from(e: IoError) -> Self {
        match e.kind() {
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                PumpEnd::Reset
            }
            _ => PumpEnd::Failed(e.to_string()),
        }
    }
}

/// A summary of what a pump did before it stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpReport {
    /// The direction the pump forwarded in
    pub direction: Direction,

    /// The number of bytes read from the source
    pub bytes_read: u64,

    /// The number of bytes written to the destination, including any
    /// injected payload
    pub bytes_written: u64,

    /// Whether the payload was injected
    pub injected: bool,

    /// How the pump stopped
    pub end: PumpEnd,
}

/// A future which reads from `reader` and writes everything it reads to
/// `writer`, in order, until the reader reaches end of stream or either side
/// fails. If a `Splicer` is attached, every chunk read is passed through it
/// and the chunks it returns are written in its place.
///
/// Every chunk is written in full before the next read is attempted. The
/// future never fails: the way it stopped is recorded in the `PumpReport` it
/// resolves to.
pub struct Pump<R, W> {
    session: u64,
    direction: Direction,
    reader: R,
    writer: W,
    splicer: Option<Splicer>,
    buf: Box<[u8]>,
    pending: VecDeque<Bytes>,
    read_done: bool,
    bytes_read: u64,
    bytes_written: u64,
}

impl<R, W> Pump<R, W>
where
    R: AsyncRead,
    W: AsyncWrite,
{
    /// Create a new pump for the given session. A pump without a `Splicer`
    /// forwards verbatim.
    pub fn new(
        session: u64,
        direction: Direction,
        reader: R,
        writer: W,
        splicer: Option<Splicer>,
    ) -> Self {
        Self {
            session,
            direction,
            reader,
            writer,
            splicer,
            buf: vec![0; BUFFER_SIZE].into_boxed_slice(),
            pending: VecDeque::new(),
            read_done: false,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    fn injected(&self) -> bool {
        self.splicer.as_ref().map_or(false, Splicer::has_injected)
    }

    fn report(&self, end: PumpEnd) -> PumpReport {
        PumpReport {
            direction: self.direction,
            bytes_read: self.bytes_read,
            bytes_written: self.bytes_written,
            injected: self.injected(),
            end,
        }
    }

    /// Queue the chunks to write for a freshly read chunk
    fn enqueue(&mut self, chunk: Bytes) {
        match &mut self.splicer {
            Some(splicer) => {
                let already = splicer.has_injected();
                let chunks = splicer.process(chunk);

                if !already && splicer.has_injected() {
                    info!(
                        "[{}] trigger marker sent by client identified, injecting {} byte payload",
                        self.session,
                        splicer.payload_len()
                    );
                }

                self.pending.extend(chunks);
            }
            None => self.pending.push_back(chunk),
        }
    }

    fn poll_transfer(&mut self) -> Poll<(), IoError> {
        loop {
            // write out everything queued before reading again
            while let Some(chunk) = self.pending.front_mut() {
                let n = try_ready!(self.writer.poll_write(&chunk[..]));
                if n == 0 {
                    return Err(IoError::new(
                        ErrorKind::WriteZero,
                        "write zero bytes into destination",
                    ));
                }

                self.bytes_written += n as u64;

                if n == chunk.len() {
                    self.pending.pop_front();
                } else {
                    chunk.advance(n);
                }
            }

            if self.read_done {
                try_ready!(self.writer.poll_flush());
                return Ok(Async::Ready(()));
            }

            let n = try_ready!(self.reader.poll_read(&mut self.buf));
            if n == 0 {
                self.read_done = true;
                continue;
            }

            trace!("[{}] {}: {} bytes", self.session, self.direction, n);

            self.bytes_read += n as u64;
            let chunk = Bytes::from(&self.buf[..n]);
            self.enqueue(chunk);
        }
    }
}

impl<R, W> Future for Pump<R, W>
where
    R: AsyncRead,
    W: AsyncWrite,
{
    type Item = PumpReport;
    type Error = ();

    fn poll(&mut self) -> Poll<PumpReport, ()> {
        match self.poll_transfer() {
            Ok(Async::NotReady) => Ok(Async::NotReady),
            Ok(Async::Ready(())) => Ok(Async::Ready(self.report(PumpEnd::Eof))),
            Err(e) => Ok(Async::Ready(self.report(e.into()))),
        }
    }
}
