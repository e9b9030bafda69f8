//! Single-client TCP relay.
//!
//! keyhole accepts TCP connections on one bound address and forwards them,
//! byte for byte, to one fixed remote endpoint, but only for a single
//! allow-listed IPv4 peer. Any other caller that probes the port is shown a
//! minimal decoy response and disconnected. A watchdog bounds the process
//! lifetime: once it fires, the listener closes and no further connections
//! are accepted.
//!
//! Forwarded traffic is an opaque byte stream: no protocol awareness, no
//! TLS, no rewriting.

pub mod access;
pub mod config;
pub mod decoy;
pub mod error;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod watchdog;
