//! Coalescing adapter between the store's change channel and a slow
//! external consumer.
//!
//! The folding path broadcasts every mutation individually. A downstream
//! transport that forwarded each one would flood during a busy net; the
//! [`Coalescer`] waits for the first change, keeps draining for a short
//! window, and hands over the batch. Lagged receivers lose messages by
//! broadcast semantics — acceptable, since a snapshot recovers full
//! fidelity.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::store::Change;

pub struct Coalescer {
    rx: broadcast::Receiver<Change>,
    window: Duration,
}

impl Coalescer {
    pub fn new(rx: broadcast::Receiver<Change>, window: Duration) -> Coalescer {
        Coalescer { rx, window }
    }

    /// Wait for the next batch of changes. Returns `None` once the store is
    /// gone and the channel drained.
    pub async fn next_batch(&mut self) -> Option<Vec<Change>> {
        let first = loop {
            match self.rx.recv().await {
                Ok(change) => break change,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(dropped = n, "subscriber lagged, changes dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        };

        let mut batch = vec![first];
        let deadline = tokio::time::Instant::now() + self.window;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Ok(change)) => batch.push(change),
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    tracing::debug!(dropped = n, "subscriber lagged, changes dropped");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => break,
            }
        }
        Some(batch)
    }
}
