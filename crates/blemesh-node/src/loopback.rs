//! In-process transport with a simulated Generic OnOff server
//!
//! Every access message is encoded to its wire form and decoded again on the
//! peer side, so the node exercises the same opcode framing a radio bearer
//! would carry. The peer answers Get and Set with a Status after a random
//! delay, and drops a configurable share of its answers.

use async_trait::async_trait;
use blemesh_core::{decode_access, encode_access, Address, MsgContext, Opcode, Result};
use blemesh_models::{InboundMessage, LowerEvent, MeshTransport, ModelId};
use bytes::Bytes;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

pub const ONOFF_GET: Opcode = Opcode::two(0x82, 0x01);
pub const ONOFF_SET: Opcode = Opcode::two(0x82, 0x02);
pub const ONOFF_SET_UNACK: Opcode = Opcode::two(0x82, 0x03);
pub const ONOFF_STATUS: Opcode = Opcode::two(0x82, 0x04);

/// Loopback peer behaviour
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Address of the local node
    pub local: Address,
    /// Share of answers dropped, 0.0 to 1.0
    pub drop_rate: f64,
    /// Shortest answer delay
    pub min_delay: Duration,
    /// Longest answer delay
    pub max_delay: Duration,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            local: Address::new(0x0001),
            drop_rate: 0.0,
            min_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(300),
        }
    }
}

pub struct LoopbackTransport {
    config: LoopbackConfig,
    /// OnOff state of each simulated peer
    peers: HashMap<Address, u8>,
    inbound_tx: mpsc::UnboundedSender<LowerEvent>,
    inbound_rx: mpsc::UnboundedReceiver<LowerEvent>,
}

impl LoopbackTransport {
    pub fn new(config: LoopbackConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            config,
            peers: HashMap::new(),
            inbound_tx,
            inbound_rx,
        }
    }

    /// Peer side: apply the message and build the status, if one is due
    fn serve(&mut self, dst: Address, opcode: Opcode, params: &[u8]) -> Option<u8> {
        let state = self.peers.entry(dst).or_insert(0);
        match opcode {
            op if op == ONOFF_GET => Some(*state),
            op if op == ONOFF_SET || op == ONOFF_SET_UNACK => {
                // OnOff, TID, optional transition time and delay
                let onoff = *params.first()?;
                if onoff > 1 {
                    debug!("Peer {} ignoring invalid OnOff value {}", dst, onoff);
                    return None;
                }
                *state = onoff;
                (op == ONOFF_SET).then_some(onoff)
            }
            _ => None,
        }
    }
}

#[async_trait]
impl MeshTransport for LoopbackTransport {
    fn send(
        &mut self,
        model: ModelId,
        ctx: &MsgContext,
        opcode: Opcode,
        payload: &[u8],
    ) -> Result<()> {
        let pdu = encode_access(opcode, payload)?;
        trace!("Loopback PDU to {}: {:02X?}", ctx.addr, pdu.as_ref());

        let (opcode, params) = decode_access(&pdu)?;
        let Some(present) = self.serve(ctx.addr, opcode, &params) else {
            return Ok(());
        };

        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.config.drop_rate) {
            debug!("Peer {} dropping status for {}", ctx.addr, opcode);
            return Ok(());
        }
        let delay = rng.gen_range(self.config.min_delay..=self.config.max_delay);

        let status = InboundMessage {
            model,
            ctx: MsgContext::received(ctx.addr, self.config.local),
            opcode: ONOFF_STATUS,
            payload: Bytes::copy_from_slice(&[present]),
        };
        let inbound_tx = self.inbound_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbound_tx.send(LowerEvent::Message(status));
        });
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<LowerEvent>> {
        Ok(self.inbound_rx.recv().await)
    }

    fn name(&self) -> &str {
        "loopback"
    }
}
