//! Transaction timers
//!
//! A [`TimerService`] arms one timer per tracked transaction. When a timer
//! expires its [`TimerKey`] is handed back to the processing context, which calls
//! `ClientState::on_timeout`. Cancelling is best effort: a key that was already
//! in flight when the transaction matched is ignored by the registry.

use blemesh_core::Address;
use std::fmt;
use std::time::Duration;

use crate::model::ModelId;

/// Transaction identifier, unique per client state
pub type TxnId = u64;

/// Identifies the transaction a timer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Owning client model
    pub model: ModelId,
    /// Destination of the request
    pub dst: Address,
    /// Transaction id
    pub txn: TxnId,
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.model, self.dst, self.txn)
    }
}

/// Handle to an armed timer
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    /// Handle whose cancellation runs `cancel`
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Handle with nothing to cancel
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Stop the timer; harmless if it already fired
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// Source of transaction timers
pub trait TimerService: Send + Sync {
    /// Arm a timer that reports `key` after `after`
    fn start(&self, key: TimerKey, after: Duration) -> TimerHandle;
}
