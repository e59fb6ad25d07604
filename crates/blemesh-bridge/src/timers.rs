//! Tokio-backed transaction timers.

use std::time::Duration;
use tokio::sync::mpsc;

use blemesh_models::{TimerHandle, TimerKey, TimerService};

/// Arms one sleeping task per timer; expired keys arrive on the returned receiver
///
/// Must be used from within a tokio runtime.
pub struct TokioTimers {
    expired_tx: mpsc::UnboundedSender<TimerKey>,
}

impl TokioTimers {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerKey>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        (Self { expired_tx }, expired_rx)
    }
}

impl TimerService for TokioTimers {
    fn start(&self, key: TimerKey, after: Duration) -> TimerHandle {
        let expired_tx = self.expired_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = expired_tx.send(key);
        });
        TimerHandle::new(move || task.abort())
    }
}
