//! Bounded queue between two execution contexts
//!
//! Submission never blocks: a full or closed queue is reported as
//! `DispatchFailed` and the rejected envelope is dropped on the spot. The
//! receiving side hands each envelope to exactly one handler call and drops it
//! afterwards.

use blemesh_core::{MeshError, Result};
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::copy::{CopyScope, DeepCopier};
use crate::envelope::{Envelope, Payload};

/// Create a queue holding up to `capacity` envelopes
pub fn channel<P: Payload>(capacity: usize) -> (BridgeSender<P>, BridgeReceiver<P>) {
    let (tx, rx) = mpsc::channel(capacity);
    (BridgeSender { tx }, BridgeReceiver { rx })
}

/// Submitting side
pub struct BridgeSender<P> {
    tx: mpsc::Sender<Envelope<P>>,
}

impl<P> Clone for BridgeSender<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<P: Payload> BridgeSender<P> {
    /// Submit a payload that owns all of its data
    pub fn submit(&self, payload: P) -> Result<()> {
        self.submit_envelope(Envelope::new(payload))
    }

    /// Submit a payload built from borrowed data
    ///
    /// `build` copies every nested field through the scope it is given; the
    /// envelope is marked degraded if any field was left empty.
    pub fn submit_with<F>(&self, copier: &DeepCopier, build: F) -> Result<()>
    where
        F: FnOnce(&mut CopyScope<'_>) -> Result<P>,
    {
        let mut scope = copier.scope();
        let payload = build(&mut scope)?;
        let degraded = scope.is_degraded();
        self.submit_envelope(Envelope::new(payload).with_degraded(degraded))
    }

    /// Submit, waiting for queue space instead of failing
    pub async fn submit_wait(&self, payload: P) -> Result<()> {
        self.tx
            .send(Envelope::new(payload))
            .await
            .map_err(|_| MeshError::ChannelClosed)
    }

    /// Submit an envelope that was already built
    pub fn submit_envelope(&self, envelope: Envelope<P>) -> Result<()> {
        let subsystem = envelope.subsystem();
        let action = envelope.action();
        match self.tx.try_send(envelope) {
            Ok(()) => {
                trace!("Queued {}/{}", subsystem, action);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                error!("Dispatch of {}/{} failed: queue full", subsystem, action);
                Err(MeshError::DispatchFailed(format!(
                    "{}/{}: queue full",
                    subsystem, action
                )))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Dispatch of {}/{} failed: queue closed", subsystem, action);
                Err(MeshError::DispatchFailed(format!(
                    "{}/{}: queue closed",
                    subsystem, action
                )))
            }
        }
    }

    /// Whether a submission right now would find a free slot
    pub fn has_room(&self) -> bool {
        self.tx.capacity() > 0
    }

    /// Wait for a free slot and hold it
    pub async fn reserve(&self) -> Result<mpsc::OwnedPermit<Envelope<P>>> {
        self.tx
            .clone()
            .reserve_owned()
            .await
            .map_err(|_| MeshError::ChannelClosed)
    }

    /// Whether the receiving side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming side
pub struct BridgeReceiver<P> {
    rx: mpsc::Receiver<Envelope<P>>,
}

impl<P: Payload> BridgeReceiver<P> {
    /// Next envelope; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<Envelope<P>> {
        self.rx.recv().await
    }

    /// Consume until every sender is gone, returning how many envelopes ran
    pub async fn run<F>(mut self, mut handler: F) -> u64
    where
        F: FnMut(Envelope<P>),
    {
        let mut handled = 0;
        while let Some(envelope) = self.rx.recv().await {
            handler(envelope);
            handled += 1;
        }
        handled
    }

    /// Stop accepting submissions; queued envelopes can still be received
    pub fn close(&mut self) {
        self.rx.close();
    }
}
