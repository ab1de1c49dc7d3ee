//! Configuration for the relay, loaded from a JSON file and overridden from
//! the command line

use crate::inject::{presets, Injection, InjectionError};
use bytes::Bytes;
use failure_derive::Fail;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::io::Error as IoError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

/// The port SSH servers listen on
pub const DEFAULT_PORT: u16 = 22;

/// An error loading or resolving the configuration
#[derive(Debug, Fail)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[fail(display = "error reading {}: {}", path, cause)]
    Read {
        /// The path of the file
        path: String,

        /// The underlying error
        #[cause]
        cause: IoError,
    },

    /// The configuration file was not valid
    #[fail(display = "error parsing {}: {}", path, cause)]
    Parse {
        /// The path of the file
        path: String,

        /// The underlying error
        #[cause]
        cause: serde_json::Error,
    },

    /// A hex encoded value could not be decoded
    #[fail(display = "invalid hex for {}: {}", field, cause)]
    InvalidHex {
        /// The name of the offending value
        field: &'static str,

        /// The underlying error
        #[cause]
        cause: hex::FromHexError,
    },

    /// No server address was given
    #[fail(display = "no server address configured")]
    MissingServer,

    /// The configured marker cannot be used
    #[fail(display = "{}", _0)]
    Injection(#[cause] InjectionError),
}

/// Persistent configuration for the relay. Any field missing from a
/// configuration file takes its default value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// The interface address to bind the relay to
    pub proxy_ip: IpAddr,

    /// The port to bind the relay to
    pub proxy_port: u16,

    /// The address of the server to relay to
    pub server_ip: Option<IpAddr>,

    /// The port of the server to relay to
    pub server_port: u16,

    /// The trigger marker, hex encoded. The SSH rogue session marker is used
    /// when unset.
    pub marker: Option<String>,

    /// The payload to inject, hex encoded. The SSH rogue session payload is
    /// used when unset.
    pub payload: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            proxy_port: DEFAULT_PORT,
            server_ip: None,
            server_port: DEFAULT_PORT,
            marker: None,
            payload: None,
        }
    }
}

impl Config {
    /// Load the configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();

        let text = read_to_string(path).map_err(|cause| ConfigError::Read {
            path: display.clone(),
            cause,
        })?;

        serde_json::from_str(&text).map_err(|cause| ConfigError::Parse {
            path: display,
            cause,
        })
    }

    /// Get the address the relay should listen on
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.proxy_ip, self.proxy_port)
    }

    /// Get the address of the server to relay to
    pub fn upstream_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server_ip
            .map(|ip| SocketAddr::new(ip, self.server_port))
            .ok_or(ConfigError::MissingServer)
    }

    /// Build the injection described by this configuration. Each of the
    /// marker and payload falls back to the SSH rogue session preset when
    /// not configured.
    pub fn injection(&self) -> Result<Injection, ConfigError> {
        let marker = match &self.marker {
            Some(hex) => Bytes::from(decode_hex("marker", hex)?),
            None => Bytes::from_static(presets::SSH_NEWKEYS_MARKER),
        };

        let payload = match &self.payload {
            Some(hex) => Bytes::from(decode_hex("payload", hex)?),
            None => Bytes::from_static(presets::ROGUE_USERAUTH_REQUEST),
        };

        Injection::new(marker, payload).map_err(ConfigError::Injection)
    }
}

/// Decode a hex string, ignoring any whitespace inside it
pub fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, ConfigError> {
    let compact = value.split_whitespace().collect::<String>();
    hex::decode(compact).map_err(|cause| ConfigError::InvalidHex { field, cause })
}
