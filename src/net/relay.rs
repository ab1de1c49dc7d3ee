#![allow(missing_docs)]

use super::session::Session;
use crate::error::RelayError;
use crate::inject::{presets, Injection};
use derive_builder::Builder;
use futures::future;
use log::{info, warn};
use std::io::Result as IoResult;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::prelude::*;

/// Counters shared between the listener and its sessions
#[derive(Debug, Default)]
pub struct RelayStats {
    accepted: AtomicU64,
    connect_failures: AtomicU64,
    completed: AtomicU64,
    injections: AtomicU64,
}

impl RelayStats {
    /// The number of client connections accepted
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    /// The number of sessions aborted because the server could not be reached
    pub fn connect_failures(&self) -> u64 {
        self.connect_failures.load(Ordering::SeqCst)
    }

    /// The number of sessions which have ended
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// The number of completed sessions in which the payload was injected
    pub fn injections(&self) -> u64 {
        self.injections.load(Ordering::SeqCst)
    }

    /// The number of sessions currently relaying
    pub fn active(&self) -> u64 {
        self.accepted()
            .saturating_sub(self.connect_failures())
            .saturating_sub(self.completed())
    }
}

/// The interception relay: accepts clients on `listen`, opens a connection
/// to `upstream` for each of them, and relays between the two with
/// `injection` applied to the client's stream.
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Relay {
    listen: SocketAddr,
    upstream: SocketAddr,
    #[builder(default = "Arc::new(presets::rogue_session())")]
    injection: Arc<Injection>,
    #[builder(setter(skip))]
    stats: Arc<RelayStats>,
}

impl Relay {
    /// Create a new relay builder
    pub fn builder() -> RelayBuilder {
        RelayBuilder::default()
    }

    /// Get the counters for this relay
    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Bind the listening socket. Failing to bind is fatal; there is no retry.
    pub fn bind(self) -> Result<BoundRelay, RelayError> {
        let listener = TcpListener::bind(&self.listen).map_err(|cause| RelayError::Bind {
            addr: self.listen,
            cause,
        })?;

        Ok(BoundRelay {
            listener,
            relay: self,
        })
    }
}

/// A relay whose listening socket has been bound
pub struct BoundRelay {
    listener: TcpListener,
    relay: Relay,
}

fn configure_stream(s: TcpStream) -> IoResult<TcpStream> {
    // injected bytes should leave immediately
    s.set_nodelay(true)?;

    Ok(s)
}

impl BoundRelay {
    /// Get the address the relay is listening on
    pub fn local_addr(&self) -> IoResult<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get the counters for this relay
    pub fn stats(&self) -> Arc<RelayStats> {
        self.relay.stats()
    }

    /// Accept connections forever, spawning a session for each one. Errors
    /// accepting a single connection are logged and do not stop the loop.
    pub fn serve(self) -> impl Future<Item = (), Error = ()> + Send {
        let BoundRelay { listener, relay } = self;
        let Relay {
            upstream,
            injection,
            stats,
            ..
        } = relay;
        let mut next_id = 0u64;

        listener
            .incoming()
            .and_then(configure_stream)
            .then(|res| -> Result<Option<TcpStream>, ()> {
                match res {
                    Ok(s) => Ok(Some(s)),
                    Err(e) => {
                        warn!("error accepting connection: {}", e);
                        Ok(None)
                    }
                }
            })
            .filter_map(|s| s)
            .for_each(move |client| {
                next_id += 1;
                stats.accepted.fetch_add(1, Ordering::SeqCst);

                tokio::spawn(connect_session(
                    next_id,
                    client,
                    upstream,
                    Arc::clone(&injection),
                    Arc::clone(&stats),
                ));

                Ok(())
            })
    }

    /// Accept connections until `shutdown` resolves, then release the
    /// listening socket. Sessions already running are left alone.
    pub fn serve_until<S>(self, shutdown: S) -> impl Future<Item = (), Error = ()> + Send
    where
        S: Future<Item = (), Error = ()> + Send + 'static,
    {
        let stats = self.stats();

        self.serve().select(shutdown).then(move |_| -> Result<(), ()> {
            info!(
                "listener stopped: {} connections accepted, {} sessions still running",
                stats.accepted(),
                stats.active()
            );

            Ok(())
        })
    }
}

/// Open the server connection for an accepted client and relay between the
/// two. If the server cannot be reached, only this client is dropped.
fn connect_session(
    id: u64,
    client: TcpStream,
    upstream: SocketAddr,
    injection: Arc<Injection>,
    stats: Arc<RelayStats>,
) -> impl Future<Item = (), Error = ()> + Send {
    match client.peer_addr() {
        Ok(addr) => info!("[{}] accepted connection from {}", id, addr),
        Err(_) => info!("[{}] accepted connection", id),
    }
    info!("[{}] establishing new server connection to {}", id, upstream);

    TcpStream::connect(&upstream)
        .and_then(configure_stream)
        .then(move |res| -> Box<dyn Future<Item = (), Error = ()> + Send> {
            let server = match res {
                Ok(server) => server,
                Err(e) => {
                    warn!("[{}] failed to connect to {}: {}", id, upstream, e);
                    stats.connect_failures.fetch_add(1, Ordering::SeqCst);

                    // the client is dropped without being relayed
                    let _ = client.shutdown(Shutdown::Both);
                    return Box::new(future::ok(()));
                }
            };

            let session = Session::new(id, client, server, injection);
            info!("[{}] spawning forwarding tasks", session.id());

            let session = session.run();
            let completed = Arc::clone(&stats);

            Box::new(
                session
                    .map(move |report| {
                        completed.completed.fetch_add(1, Ordering::SeqCst);
                        if report.upstream.injected {
                            completed.injections.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                    .map_err(move |_| {
                        stats.completed.fetch_add(1, Ordering::SeqCst);
                        warn!("[{}] session was cancelled before both pumps reported", id);
                    }),
            )
        })
}
