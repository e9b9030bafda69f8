//! Errors that stop a unit of work before any bytes are relayed.

use std::io;
use std::net::AddrParseError;

use thiserror::Error;

/// Fatal conditions for the relay engine.
///
/// Everything else (a failed accept, a mid-session read or write error, a
/// probe that dies halfway) is local to the connection that hit it and is
/// logged where it happens rather than surfaced through this type.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listening socket could not be bound. Startup-fatal: the relay
    /// never serves.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The configured allowed-client literal is not an IPv4 address.
    #[error("invalid allowed client address {literal:?}: {source}")]
    AllowedClient {
        literal: String,
        #[source]
        source: AddrParseError,
    },

    /// The remote endpoint could not be dialled when a session started.
    /// Aborts that session only; the inbound connection is closed.
    #[error("failed to dial remote {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },
}
