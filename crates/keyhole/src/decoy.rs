//! Decoy responder for callers outside the allow list.
//!
//! The relay should not advertise what it is to port scanners. A rejected
//! caller that sends anything gets a minimal HTTP/1.0-shaped answer and is
//! disconnected; one that stays silent is disconnected without a byte in
//! reply. The probe is never parsed. This is not an HTTP server.

use std::io;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

/// Upper bound on how much of the probe is read before answering.
const PROBE_LIMIT: usize = 2048;

/// How long to wait for a probe before giving up on a silent caller.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const BODY: &str = "It's working!";

/// Read one bounded probe from `stream`; if the caller sent anything, write
/// the canned response. The stream is shut down on return in every case.
///
/// # Errors
///
/// Returns the I/O error from writing the response or shutting the stream
/// down. Callers log it at most; nothing is retried.
pub async fn respond<S>(mut stream: S) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut probe = [0u8; PROBE_LIMIT];
    let received = match timeout(PROBE_TIMEOUT, stream.read(&mut probe)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            debug!(error = %e, "probe read failed");
            0
        }
        Err(_) => {
            debug!("probe timed out");
            0
        }
    };

    if received > 0 {
        stream.write_all(canned_response().as_bytes()).await?;
    }
    stream.shutdown().await
}

fn canned_response() -> String {
    format!(
        "HTTP/1.0 200\r\n\
         Content-Type: text/html; charset=UTF-8\r\n\
         Referrer-Policy: no-referrer\r\n\
         Content-Length: {}\r\n\
         Date: {}\r\n\
         \r\n\
         {}",
        BODY.len(),
        Utc::now().to_rfc2822(),
        BODY,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertised_length_matches_the_body() {
        assert_eq!(BODY.len(), 13);
        let response = canned_response();
        assert!(response.starts_with("HTTP/1.0 200\r\n"));
        assert!(response.contains("Content-Length: 13\r\n"));
        assert!(response.ends_with("\r\n\r\nIt's working!"));
    }

    #[test]
    fn date_header_is_valid_rfc2822() {
        let response = canned_response();
        let date = response
            .lines()
            .find_map(|l| l.strip_prefix("Date: "))
            .expect("no Date header");
        assert!(chrono::DateTime::parse_from_rfc2822(date).is_ok());
    }

    #[tokio::test]
    async fn probing_caller_receives_the_canned_response() {
        let (mut caller, stream) = tokio::io::duplex(4096);
        let responder = tokio::spawn(respond(stream));

        caller.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut reply = Vec::new();
        caller.read_to_end(&mut reply).await.unwrap();
        responder.await.unwrap().unwrap();

        let reply = String::from_utf8(reply).unwrap();
        assert!(reply.starts_with("HTTP/1.0 200\r\n"));
        assert!(reply.ends_with("It's working!"));
    }

    #[tokio::test]
    async fn silent_caller_receives_nothing() {
        let (mut caller, stream) = tokio::io::duplex(4096);
        let responder = tokio::spawn(respond(stream));

        caller.shutdown().await.unwrap();
        let mut reply = Vec::new();
        caller.read_to_end(&mut reply).await.unwrap();
        responder.await.unwrap().unwrap();

        assert!(reply.is_empty());
    }
}
