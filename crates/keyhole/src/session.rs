//! The relay session: bidirectional byte shuttling between an accepted
//! connection and a freshly dialled remote.
//!
//! For each session:
//! 1. Dial the remote. A dial failure aborts the session; the inbound
//!    connection is closed.
//! 2. Spawn one pump task per direction. Each reads fixed-size chunks and
//!    delivers every read result to the session loop as a [`ChunkEvent`]
//!    over a bounded channel (capacity one, so a pump reads at most one
//!    chunk ahead of the loop).
//! 3. The session loop takes whichever direction's event arrives first and
//!    writes the payload to the opposite stream. The first EOF, read error,
//!    or write error ends the loop.
//! 4. On exit the cancellation token stops both pumps and both write halves
//!    are shut down, so neither stream outlives the session half-open.
//!
//! Sessions are one-shot and independent: an error here never affects other
//! sessions or the accept loop.

use std::fmt;
use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::RelayError;

/// Fixed read size for one chunk.
const CHUNK_SIZE: usize = 1024;

const UPSTREAM: &str = "client→remote";
const DOWNSTREAM: &str = "remote→client";

/// One read result handed from a pump task to the session loop.
enum ChunkEvent {
    /// A payload chunk; the length is exactly what the read returned.
    Data(Bytes),
    /// The peer closed its sending side.
    Closed,
    /// The read failed.
    Failed(io::Error),
}

/// Why the session loop stopped. Reported once per session.
#[derive(Debug)]
enum SessionEnd {
    PeerClosed { direction: &'static str },
    ReadFailed { direction: &'static str, error: io::Error },
    WriteFailed { direction: &'static str, error: io::Error },
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::PeerClosed { direction } => write!(f, "{direction} closed"),
            SessionEnd::ReadFailed { direction, error } => {
                write!(f, "{direction} read failed: {error}")
            }
            SessionEnd::WriteFailed { direction, error } => {
                write!(f, "{direction} write failed: {error}")
            }
        }
    }
}

/// Relay one accepted connection to `remote` until either side closes or
/// errors, then close both streams.
///
/// # Errors
///
/// Returns [`RelayError::Dial`] if the remote cannot be reached; the
/// inbound connection is dropped, and thereby closed, in that case. I/O
/// failures after the session is up terminate the session and are logged,
/// never returned.
pub async fn run(inbound: TcpStream, remote: &str) -> Result<(), RelayError> {
    let outbound =
        TcpStream::connect(remote)
            .await
            .map_err(|source| RelayError::Dial {
                addr: remote.to_string(),
                source,
            })?;
    debug!(remote, "remote connection established");
    shuttle(inbound, outbound).await;
    Ok(())
}

/// Pump one direction: read fixed-size chunks and deliver each as a
/// [`ChunkEvent`] until the session is cancelled, the loop is gone, or the
/// read reports EOF or an error.
async fn pump<R>(mut reader: R, events: mpsc::Sender<ChunkEvent>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => ChunkEvent::Closed,
                Ok(n) => ChunkEvent::Data(Bytes::copy_from_slice(&buf[..n])),
                Err(e) => ChunkEvent::Failed(e),
            },
        };
        let terminal = !matches!(event, ChunkEvent::Data(_));
        if events.send(event).await.is_err() || terminal {
            break;
        }
    }
}

/// The session loop: wait for the next chunk from either direction (no
/// priority between them), copy it to the opposite stream, stop on the
/// first EOF, read error, or write error.
async fn shuttle<A, B>(inbound: A, outbound: B) -> SessionEnd
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (in_read, mut in_write) = tokio::io::split(inbound);
    let (out_read, mut out_write) = tokio::io::split(outbound);

    let cancel = CancellationToken::new();
    let (up_tx, mut up_rx) = mpsc::channel(1);
    let (down_tx, mut down_rx) = mpsc::channel(1);
    tokio::spawn(pump(in_read, up_tx, cancel.clone()));
    tokio::spawn(pump(out_read, down_tx, cancel.clone()));

    let mut up_bytes: u64 = 0;
    let mut down_bytes: u64 = 0;

    let end = loop {
        tokio::select! {
            event = up_rx.recv() => match event {
                Some(ChunkEvent::Data(payload)) => {
                    if let Err(error) = out_write.write_all(&payload).await {
                        break SessionEnd::WriteFailed { direction: UPSTREAM, error };
                    }
                    up_bytes += payload.len() as u64;
                }
                Some(ChunkEvent::Failed(error)) => {
                    break SessionEnd::ReadFailed { direction: UPSTREAM, error };
                }
                Some(ChunkEvent::Closed) | None => {
                    break SessionEnd::PeerClosed { direction: UPSTREAM };
                }
            },
            event = down_rx.recv() => match event {
                Some(ChunkEvent::Data(payload)) => {
                    if let Err(error) = in_write.write_all(&payload).await {
                        break SessionEnd::WriteFailed { direction: DOWNSTREAM, error };
                    }
                    down_bytes += payload.len() as u64;
                }
                Some(ChunkEvent::Failed(error)) => {
                    break SessionEnd::ReadFailed { direction: DOWNSTREAM, error };
                }
                Some(ChunkEvent::Closed) | None => {
                    break SessionEnd::PeerClosed { direction: DOWNSTREAM };
                }
            },
        }
    };

    // Stop both pumps, then close both streams. A pump mid-read wakes on
    // the cancellation branch; its unread chunk is discarded with it.
    cancel.cancel();
    let _ = in_write.shutdown().await;
    let _ = out_write.shutdown().await;
    debug!(up_bytes, down_bytes, end = %end, "session closed");

    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    #[tokio::test]
    async fn forwards_bytes_in_both_directions() {
        let (mut client, near) = tokio::io::duplex(4096);
        let (mut remote, far) = tokio::io::duplex(4096);
        let session = tokio::spawn(shuttle(near, far));

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        remote.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(client);
        let end = timeout(Duration::from_secs(2), session)
            .await
            .expect("session did not end")
            .unwrap();
        match end {
            SessionEnd::PeerClosed { direction } => assert_eq!(direction, UPSTREAM),
            other => panic!("unexpected session end: {other}"),
        }
    }

    #[tokio::test]
    async fn relays_payloads_larger_than_one_chunk() {
        let (mut client, near) = tokio::io::duplex(16384);
        let (mut remote, far) = tokio::io::duplex(16384);
        tokio::spawn(shuttle(near, far));

        let payload: Vec<u8> = (0..CHUNK_SIZE * 5 + 77).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            client.write_all(&payload).await.unwrap();
            client
        });

        let mut received = vec![0u8; expected.len()];
        timeout(Duration::from_secs(2), remote.read_exact(&mut received))
            .await
            .expect("transfer stalled")
            .unwrap();
        assert_eq!(received, expected);
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn closing_one_side_closes_the_other() {
        let (client, near) = tokio::io::duplex(4096);
        let (mut remote, far) = tokio::io::duplex(4096);
        tokio::spawn(shuttle(near, far));

        drop(client);

        let mut buf = [0u8; 1];
        let n = timeout(Duration::from_secs(2), remote.read(&mut buf))
            .await
            .expect("remote side never saw the close")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn dial_failure_aborts_the_session() {
        // Grab a port that is certainly closed by binding and dropping it.
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (inbound, _) = listener.accept().await.unwrap();

        let err = run(inbound, &closed_addr.to_string()).await.unwrap_err();
        assert!(matches!(err, RelayError::Dial { .. }));
    }
}
