//! Errors which stop the relay from starting

use crate::config::ConfigError;
use crate::inject::InjectionError;
use failure_derive::Fail;
use std::convert::From;
use std::io::Error as IoError;
use std::net::SocketAddr;

/// An error setting up the relay. Errors inside a running session never
/// surface here; they only end that session.
#[derive(Debug, Fail)]
pub enum RelayError {
    /// The listening socket could not be bound
    #[fail(display = "failed to bind {}: {}", addr, cause)]
    Bind {
        /// The address that could not be bound
        addr: SocketAddr,

        /// The underlying error
        #[cause]
        cause: IoError,
    },

    /// The relay builder was missing a required field
    #[fail(display = "invalid relay configuration: {}", _0)]
    Builder(String),

    /// The configuration could not be loaded or resolved
    #[fail(display = "configuration error: {}", _0)]
    Config(#[cause] ConfigError),

    /// The configured marker and payload were not usable
    #[fail(display = "injection error: {}", _0)]
    Injection(#[cause] InjectionError),
}

impl From<ConfigError> for RelayError {
    fn from(e: ConfigError) -> Self {
        RelayError::Config(e)
    }
}

impl From<InjectionError> for RelayError {
    fn from(e: InjectionError) -> Self {
        RelayError::Injection(e)
    }
}
