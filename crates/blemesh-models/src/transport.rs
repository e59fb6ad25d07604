//! Lower-layer transport abstraction
//!
//! Network and lower transport (segmentation, encryption, relaying, bearers) sit
//! behind [`MeshTransport`]. Sends are synchronous hand-offs into the lower
//! layer's own queue and say nothing about delivery; inbound traffic is pulled by
//! the processing context through [`MeshTransport::recv`].

use async_trait::async_trait;
use blemesh_core::{MeshError, MsgContext, Opcode, Result, Role};
use bytes::Bytes;

use crate::model::ModelId;
use crate::prov::{ProvCall, ProvEvent};

/// Access message received for a local model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Local model the message was dispatched to
    pub model: ModelId,
    /// Source in `addr`, destination in `recv_dst`
    pub ctx: MsgContext,
    pub opcode: Opcode,
    pub payload: Bytes,
}

/// Anything the lower layers deliver to the processing context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LowerEvent {
    /// Access message
    Message(InboundMessage),
    /// Provisioning notification
    Prov(ProvEvent),
}

/// Lower layers of the mesh stack
#[async_trait]
pub trait MeshTransport: Send {
    /// Hand an access message to the lower layers
    fn send(&mut self, model: ModelId, ctx: &MsgContext, opcode: Opcode, payload: &[u8])
        -> Result<()>;

    /// Publish on the model's configured publication address
    fn publish(
        &mut self,
        model: ModelId,
        role: Role,
        opcode: Opcode,
        payload: &[u8],
    ) -> Result<()> {
        let _ = (model, role, opcode, payload);
        Err(MeshError::Unsupported(format!(
            "{} does not support publication",
            self.name()
        )))
    }

    /// Execute a provisioning-layer request
    fn handle_prov(&mut self, call: &ProvCall) -> Result<()> {
        Err(MeshError::Unsupported(format!(
            "{} does not handle {}",
            self.name(),
            call.action()
        )))
    }

    /// Wait for the next inbound event; `None` once the lower layers have shut down
    async fn recv(&mut self) -> Result<Option<LowerEvent>>;

    /// Transport name for logging
    fn name(&self) -> &str;
}
