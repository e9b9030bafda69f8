//! Process-lifetime watchdog.

use std::time::Duration;

use tokio::sync::oneshot;

/// Arm the watchdog. The returned receiver resolves exactly once, `after`
/// the given duration, and never again; there is no payload and no repeat.
pub fn arm(after: Duration) -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        // Nobody listening means the dispatcher is already gone.
        let _ = tx.send(());
    });
    rx
}
