//! Accept loop and dispatch.
//!
//! The accept loop runs in its own task and forwards every accept result,
//! success or failure, to the dispatcher in arrival order. The dispatcher
//! owns the decision per connection: an allowed peer gets a relay session,
//! anyone else gets the decoy, and an accept error is logged and skipped.
//! The lifetime watchdog is the only thing that stops the dispatcher;
//! sessions already running when it fires are left to finish on their own.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::access::ClientPolicy;
use crate::config::Config;
use crate::error::RelayError;
use crate::{decoy, session, watchdog};

/// The bound relay server: listening socket plus the immutable endpoint
/// configuration it serves.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    policy: ClientPolicy,
    cfg: Config,
}

impl Server {
    /// Bind the listening socket and resolve the client policy.
    ///
    /// # Errors
    ///
    /// A bind failure or an unparseable allowed-client literal is fatal:
    /// the relay never serves.
    pub async fn bind(cfg: Config) -> Result<Self, RelayError> {
        let policy = ClientPolicy::from_literal(&cfg.allowed_client)?;
        let listener =
            TcpListener::bind(&cfg.bind_addr)
                .await
                .map_err(|source| RelayError::Bind {
                    addr: cfg.bind_addr.clone(),
                    source,
                })?;
        let local_addr = listener.local_addr().map_err(|source| RelayError::Bind {
            addr: cfg.bind_addr.clone(),
            source,
        })?;
        Ok(Self {
            listener,
            local_addr,
            policy,
            cfg,
        })
    }

    /// Address the listener is actually bound to. Differs from the
    /// configured one when that used port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the lifetime watchdog fires, then close the listener.
    pub async fn run(self) -> Result<(), RelayError> {
        let Server {
            listener,
            local_addr,
            policy,
            cfg,
        } = self;
        info!(
            addr = %local_addr,
            remote = %cfg.remote_addr,
            lifetime_secs = cfg.lifetime_secs,
            "relay listening"
        );

        let cancel = CancellationToken::new();
        let (accept_tx, mut accept_rx) = mpsc::channel(1);
        tokio::spawn(accept_loop(listener, accept_tx, cancel.clone()));
        let mut shutdown = watchdog::arm(Duration::from_secs(cfg.lifetime_secs));

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("lifetime elapsed, shutting down");
                    break;
                }
                accepted = accept_rx.recv() => match accepted {
                    Some(Ok((conn, peer))) => dispatch(policy, &cfg.remote_addr, conn, peer),
                    Some(Err(e)) => warn!(error = %e, "accept error"),
                    // Accept loop is gone; nothing more will arrive.
                    None => break,
                },
            }
        }

        // Stops the accept loop, which owns the listener and closes it.
        cancel.cancel();
        Ok(())
    }
}

/// Route one accepted connection: relay session for the allowed peer, decoy
/// for everyone else. Never blocks the dispatcher on connection I/O.
fn dispatch(policy: ClientPolicy, remote: &str, conn: TcpStream, peer: SocketAddr) {
    if policy.allows(&peer) {
        info!(%peer, remote, "opening relay session");
        let remote = remote.to_string();
        tokio::spawn(async move {
            if let Err(e) = session::run(conn, &remote).await {
                warn!(%peer, error = %e, "session aborted");
            }
        });
    } else {
        info!(%peer, "unauthorized connection");
        tokio::spawn(async move {
            if let Err(e) = decoy::respond(conn).await {
                debug!(%peer, error = %e, "decoy response failed");
            }
        });
    }
}

/// Forward every accept result, in order, until cancelled or the dispatcher
/// goes away. The listener is dropped, and the socket closed, on exit.
async fn accept_loop(
    listener: TcpListener,
    results: mpsc::Sender<io::Result<(TcpStream, SocketAddr)>>,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => result,
        };
        if results.send(result).await.is_err() {
            break;
        }
    }
}
