//! A relayed pair of client and server connections

use super::pump::{Direction, Pump, PumpEnd, PumpReport};
use super::stream::SharedStream;
use crate::inject::Injection;
use futures::sync::oneshot::{self, Canceled};
use futures::Future;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A summary of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// The id assigned to the session by the listener
    pub id: u64,

    /// What the injecting client-to-server pump did
    pub upstream: PumpReport,

    /// What the passthrough server-to-client pump did
    pub downstream: PumpReport,
}

/// Closes both connections of a session at most once, no matter how many
/// pumps ask for it.
#[derive(Debug)]
pub struct SessionCloser {
    id: u64,
    client: SharedStream,
    server: SharedStream,
    closed: AtomicBool,
}

impl SessionCloser {
    /// Create a closer for the given pair of connections
    pub fn new(id: u64, client: SharedStream, server: SharedStream) -> Self {
        Self {
            id,
            client,
            server,
            closed: AtomicBool::new(false),
        }
    }

    /// Close both connections. Returns `true` if this call closed them, or
    /// `false` if they had already been closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        for (name, stream) in &[("client", &self.client), ("server", &self.server)] {
            if let Err(e) = stream.close() {
                debug!("[{}] error closing {} connection: {}", self.id, name, e);
            }
        }

        true
    }

    /// Check whether the connections have been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// One client connection and the server connection opened for it, relayed
/// together. The client-to-server direction runs through the injection; the
/// server-to-client direction is forwarded verbatim.
pub struct Session {
    id: u64,
    client: SharedStream,
    server: SharedStream,
    injection: Arc<Injection>,
}

impl Session {
    /// Create a new session relaying between `client` and `server`
    pub fn new(id: u64, client: TcpStream, server: TcpStream, injection: Arc<Injection>) -> Self {
        Self {
            id,
            client: SharedStream::new(client),
            server: SharedStream::new(server),
            injection,
        }
    }

    /// Get the id of this session
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Spawn both pumps onto the current executor and get a future resolving
    /// once both have stopped. Whichever pump stops first closes both
    /// connections, which in turn stops the other one.
    ///
    /// This must be called from within a tokio runtime.
    pub fn run(self) -> impl Future<Item = SessionReport, Error = Canceled> + Send {
        let id = self.id;
        if let (Ok(client), Ok(server)) = (self.client.peer_addr(), self.server.peer_addr()) {
            debug!("[{}] relaying between {} and {}", id, client, server);
        }

        let closer = Arc::new(SessionCloser::new(
            id,
            self.client.clone(),
            self.server.clone(),
        ));

        let upstream = Pump::new(
            id,
            Direction::ClientToServer,
            self.client.clone(),
            self.server.clone(),
            Some(self.injection.splicer()),
        );
        let downstream = Pump::new(
            id,
            Direction::ServerToClient,
            self.server,
            self.client,
            None,
        );

        let upstream = spawn_pump(id, upstream, Arc::clone(&closer));
        let downstream = spawn_pump(id, downstream, closer);

        upstream
            .join(downstream)
            .map(move |(upstream, downstream)| {
                info!(
                    "[{}] session closed: {} bytes to server, {} bytes to client",
                    id, upstream.bytes_written, downstream.bytes_written
                );

                SessionReport {
                    id,
                    upstream,
                    downstream,
                }
            })
    }
}

/// Spawn `pump` as its own task. When it stops, its end is logged and both
/// connections are closed before its report is sent back.
fn spawn_pump<R, W>(
    id: u64,
    pump: Pump<R, W>,
    closer: Arc<SessionCloser>,
) -> oneshot::Receiver<PumpReport>
where
    R: AsyncRead + Send + 'static,
    W: AsyncWrite + Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    tokio::spawn(pump.map(move |report| {
        log_end(id, &report);

        if closer.close() {
            debug!("[{}] closed client and server connections", id);
        }

        // the session may have been dropped, nobody is waiting then
        let _ = tx.send(report);
    }));

    rx
}

fn log_end(id: u64, report: &PumpReport) {
    match &report.end {
        PumpEnd::Eof => info!(
            "[{}] {} ran out of data after {} bytes, closing sockets",
            id, report.direction, report.bytes_read
        ),
        PumpEnd::Reset => warn!(
            "[{}] {} connection has been reset, closing sockets",
            id, report.direction
        ),
        PumpEnd::Failed(e) => error!(
            "[{}] {} failed: {}, closing sockets",
            id, report.direction, e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{TcpListener as StdListener, TcpStream as StdStream};
    use std::sync::Barrier;
    use std::thread::spawn;
    use std::time::Duration;
    use tokio::runtime::Runtime;

    /// Connect a relay-side stream to a blocking peer on loopback
    fn loopback(rt: &mut Runtime) -> (SharedStream, StdStream) {
        let listener = StdListener::bind("127.0.0.1:0").expect("error binding listener");
        let addr = listener.local_addr().unwrap();

        let stream = rt
            .block_on(TcpStream::connect(&addr))
            .expect("error connecting");
        let (peer, _) = listener.accept().expect("error accepting");
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        (SharedStream::new(stream), peer)
    }

    #[test]
    fn test_concurrent_close_runs_once() {
        let mut rt = Runtime::new().expect("error creating runtime");
        let (client, mut client_peer) = loopback(&mut rt);
        let (server, mut server_peer) = loopback(&mut rt);

        assert_eq!(client.peer_addr().unwrap(), client_peer.local_addr().unwrap());

        let closer = Arc::new(SessionCloser::new(7, client, server));
        assert!(!closer.is_closed());

        let barrier = Arc::new(Barrier::new(2));
        let handles = (0..2)
            .map(|_| {
                let closer = Arc::clone(&closer);
                let barrier = Arc::clone(&barrier);
                spawn(move || {
                    barrier.wait();
                    closer.close()
                })
            })
            .collect::<Vec<_>>();

        let closed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&closed| closed)
            .count();

        assert_eq!(closed, 1);
        assert!(closer.is_closed());
        assert!(!closer.close());

        let mut buf = [0; 16];
        assert_eq!(client_peer.read(&mut buf).unwrap(), 0);
        assert_eq!(server_peer.read(&mut buf).unwrap(), 0);
    }
}
