//! Splicepipe - a transparent TCP relay which watches the client's stream for
//! a trigger marker and, the first time it appears, splices a forged protocol
//! message in front of it. Everything else is forwarded verbatim in both
//! directions.
//!
//! This crate exposes the relay as a library, allowing other marker and
//! payload pairs to be used with the same engine.

#![deny(bare_trait_objects)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod inject;
pub mod net;
