//! `keyhole` — relay daemon entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise logging.
//! 3. Bind the listener and run the dispatch loop until the lifetime
//!    watchdog fires.

use anyhow::Result;

use keyhole::config::Config;
use keyhole::server::Server;
use keyhole::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: keyhole configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;

    // -----------------------------------------------------------------------
    // 3. Serve
    // -----------------------------------------------------------------------
    let server = Server::bind(cfg).await?;
    server.run().await?;
    Ok(())
}
