//! Test doubles for the transport and timer collaborators
//!
//! [`MockTransport`] records every hand-off and lets a test inject inbound
//! traffic through a cloneable [`MockTransportHandle`], which keeps working
//! after the transport itself has been moved into a running stack.
//! [`ManualTimers`] records armed and cancelled timers without ever firing.

use async_trait::async_trait;
use blemesh_core::{MeshError, MsgContext, Opcode, Result, Role};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::model::ModelId;
use crate::prov::{ProvCall, ProvEvent};
use crate::timer::{TimerHandle, TimerKey, TimerService};
use crate::transport::{InboundMessage, LowerEvent, MeshTransport};

/// A message handed to [`MockTransport::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub model: ModelId,
    pub ctx: MsgContext,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// Builds the reply a simulated peer sends for a request
pub type Responder = Box<dyn FnMut(&SentMessage) -> Option<InboundMessage> + Send>;

#[derive(Default)]
struct MockState {
    sent: Vec<SentMessage>,
    published: Vec<(ModelId, Role, Opcode)>,
    prov_calls: Vec<ProvCall>,
    fail_next: Option<MeshError>,
    responder: Option<Responder>,
}

/// Recording transport
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    inbound_tx: mpsc::UnboundedSender<LowerEvent>,
    inbound_rx: mpsc::UnboundedReceiver<LowerEvent>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            inbound_tx,
            inbound_rx,
        }
    }

    /// Handle for inspecting and driving this transport from a test
    pub fn handle(&self) -> MockTransportHandle {
        MockTransportHandle {
            state: self.state.clone(),
            inbound_tx: self.inbound_tx.clone(),
        }
    }

    /// Answer sends with whatever `responder` returns
    pub fn with_responder(
        self,
        responder: impl FnMut(&SentMessage) -> Option<InboundMessage> + Send + 'static,
    ) -> Self {
        self.state.lock().responder = Some(Box::new(responder));
        self
    }

    /// Make the next send fail with `err`
    pub fn fail_next_send(&mut self, err: MeshError) {
        self.state.lock().fail_next = Some(err);
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }
}

#[async_trait]
impl MeshTransport for MockTransport {
    fn send(
        &mut self,
        model: ModelId,
        ctx: &MsgContext,
        opcode: Opcode,
        payload: &[u8],
    ) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }

        let msg = SentMessage {
            model,
            ctx: *ctx,
            opcode,
            payload: payload.to_vec(),
        };
        if let Some(responder) = state.responder.as_mut() {
            if let Some(reply) = responder(&msg) {
                let _ = self.inbound_tx.send(LowerEvent::Message(reply));
            }
        }
        state.sent.push(msg);
        Ok(())
    }

    fn publish(
        &mut self,
        model: ModelId,
        role: Role,
        opcode: Opcode,
        _payload: &[u8],
    ) -> Result<()> {
        self.state.lock().published.push((model, role, opcode));
        Ok(())
    }

    fn handle_prov(&mut self, call: &ProvCall) -> Result<()> {
        self.state.lock().prov_calls.push(call.clone());
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<LowerEvent>> {
        Ok(self.inbound_rx.recv().await)
    }

    fn name(&self) -> &str {
        "MockTransport"
    }
}

/// Test-side view of a [`MockTransport`]
#[derive(Clone)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockState>>,
    inbound_tx: mpsc::UnboundedSender<LowerEvent>,
}

impl MockTransportHandle {
    /// Deliver an access message to a local model
    pub fn inject(&self, model: ModelId, ctx: MsgContext, opcode: Opcode, payload: &[u8]) {
        let _ = self.inbound_tx.send(LowerEvent::Message(InboundMessage {
            model,
            ctx,
            opcode,
            payload: Bytes::copy_from_slice(payload),
        }));
    }

    /// Deliver a provisioning notification
    pub fn inject_prov(&self, event: ProvEvent) {
        let _ = self.inbound_tx.send(LowerEvent::Prov(event));
    }

    pub fn fail_next_send(&self, err: MeshError) {
        self.state.lock().fail_next = Some(err);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    pub fn published(&self) -> Vec<(ModelId, Role, Opcode)> {
        self.state.lock().published.clone()
    }

    pub fn prov_calls(&self) -> Vec<ProvCall> {
        self.state.lock().prov_calls.clone()
    }
}

/// Timer service that only records
#[derive(Clone, Default)]
pub struct ManualTimers {
    started: Arc<Mutex<Vec<(TimerKey, Duration)>>>,
    cancelled: Arc<Mutex<Vec<TimerKey>>>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every armed timer with its duration, in order
    pub fn started(&self) -> Vec<(TimerKey, Duration)> {
        self.started.lock().clone()
    }

    /// Every cancelled timer, in order
    pub fn cancelled(&self) -> Vec<TimerKey> {
        self.cancelled.lock().clone()
    }
}

impl TimerService for ManualTimers {
    fn start(&self, key: TimerKey, after: Duration) -> TimerHandle {
        self.started.lock().push((key, after));
        let cancelled = self.cancelled.clone();
        TimerHandle::new(move || cancelled.lock().push(key))
    }
}
