//! Client transaction tracking
//!
//! Mesh access messages carry no end-to-end acknowledgement, so a client model
//! correlates its own requests with the status messages that answer them. Each
//! [`ClientState`] keeps at most one outstanding [`Transaction`] per destination
//! and finalizes every transaction exactly once:
//!
//! ```text
//!             send_request (need_ack, unicast dst)
//!                          │
//!              ┌───────────┼──────────────┐
//!              ▼           ▼              ▼
//!          Cancelled    Pending ───► Matched   (on_receive: src + status opcode)
//!        (send failed)     │
//!                          └───────► TimedOut  (on_timeout: same txn id)
//! ```
//!
//! Match and timeout both remove the transaction under the same lock, and a
//! timeout only applies if the transaction id in its key is still the one stored
//! for that destination, so a late timer can neither double-finalize a matched
//! transaction nor kill a newer one to the same node.

use blemesh_core::{Address, Capabilities, MeshError, MsgContext, Opcode, Result, Role};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::model::ModelId;
use crate::op_pair::OpcodePairTable;
use crate::timer::{TimerHandle, TimerKey, TimerService, TxnId};
use crate::transport::MeshTransport;

/// Outbound client request
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// Destination and key indices
    pub ctx: MsgContext,
    pub opcode: Opcode,
    /// Pre-encoded parameters
    pub payload: &'a [u8],
    /// Response timeout; `None` or zero uses the client default
    pub timeout: Option<Duration>,
    /// Track the request and wait for its status
    pub need_ack: bool,
}

impl<'a> Request<'a> {
    /// Acknowledged request
    pub fn new(ctx: MsgContext, opcode: Opcode, payload: &'a [u8]) -> Self {
        Self {
            ctx,
            opcode,
            payload,
            timeout: None,
            need_ack: true,
        }
    }

    /// Fire-and-forget request
    pub fn unacknowledged(ctx: MsgContext, opcode: Opcode, payload: &'a [u8]) -> Self {
        Self {
            need_ack: false,
            ..Self::new(ctx, opcode, payload)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An outstanding request awaiting its status
pub struct Transaction {
    id: TxnId,
    model: ModelId,
    ctx: MsgContext,
    opcode: Opcode,
    expected: Opcode,
    started: Instant,
    timer: Option<TimerHandle>,
}

impl Transaction {
    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn dst(&self) -> Address {
        self.ctx.addr
    }

    /// Context the request was sent with
    pub fn ctx(&self) -> &MsgContext {
        &self.ctx
    }

    /// Request opcode
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Status opcode that completes this transaction
    pub fn expected(&self) -> Opcode {
        self.expected
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn key(&self) -> TimerKey {
        TimerKey {
            model: self.model,
            dst: self.ctx.addr,
            txn: self.id,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("dst", &self.ctx.addr)
            .field("opcode", &self.opcode)
            .field("expected", &self.expected)
            .finish()
    }
}

/// Result of offering an inbound message to a client
#[derive(Debug)]
pub enum Outcome {
    /// Not an answer to anything this client is waiting for
    Unsolicited,
    /// Completed the returned transaction
    Matched(Transaction),
}

/// Outstanding transactions of one client, keyed by destination
#[derive(Debug, Default)]
pub struct TransactionRegistry {
    pending: HashMap<Address, Transaction>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dst: Address) -> Option<&Transaction> {
        self.pending.get(&dst)
    }

    pub fn contains(&self, dst: Address) -> bool {
        self.pending.contains_key(&dst)
    }

    fn insert(&mut self, txn: Transaction) {
        self.pending.insert(txn.dst(), txn);
    }

    fn remove(&mut self, dst: Address) -> Option<Transaction> {
        self.pending.remove(&dst)
    }

    /// Remove the transaction for `dst` only if it is still `txn`
    fn remove_if(&mut self, dst: Address, txn: TxnId) -> Option<Transaction> {
        match self.pending.get(&dst) {
            Some(t) if t.id == txn => self.pending.remove(&dst),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn drain(&mut self) -> impl Iterator<Item = Transaction> + '_ {
        self.pending.drain().map(|(_, txn)| txn)
    }
}

#[derive(Debug)]
struct Inner {
    registry: TransactionRegistry,
    role: Role,
    default_timeout: Duration,
}

/// Mutable state of one client model
pub struct ClientState {
    table: OpcodePairTable,
    inner: Mutex<Inner>,
    next_txn: AtomicU64,
}

impl ClientState {
    pub fn new(table: OpcodePairTable) -> Self {
        Self {
            table,
            inner: Mutex::new(Inner {
                registry: TransactionRegistry::new(),
                role: Role::Node,
                default_timeout: Duration::from_millis(blemesh_core::DEFAULT_CLIENT_TIMEOUT_MS),
            }),
            next_txn: AtomicU64::new(1),
        }
    }

    pub fn table(&self) -> &OpcodePairTable {
        &self.table
    }

    /// Timeout used by requests that carry none
    pub fn set_default_timeout(&self, timeout: Duration) {
        self.inner.lock().default_timeout = timeout;
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.lock().default_timeout
    }

    /// Select the identity the next send on this model uses
    pub fn set_role(&self, role: Role, caps: &Capabilities) -> Result<()> {
        if !caps.permits(role) {
            return Err(MeshError::InvalidArgument(format!(
                "role {} is not enabled",
                role
            )));
        }
        self.inner.lock().role = role;
        Ok(())
    }

    /// Role the next send would use
    pub fn role(&self) -> Role {
        self.inner.lock().role
    }

    /// Send a request, tracking it when a status is expected
    ///
    /// Unacknowledged requests and requests to non-unicast destinations go
    /// straight to the transport. Otherwise a transaction is reserved for the
    /// destination and its timer armed before the hand-off; if the hand-off
    /// fails the transaction is discarded without any event.
    ///
    /// # Errors
    ///
    /// - `Busy` if a transaction to the destination is outstanding
    /// - `InvalidArgument` if the opcode has no paired status
    /// - whatever the transport returns
    pub fn send_request(
        &self,
        model: ModelId,
        req: &Request<'_>,
        transport: &mut dyn MeshTransport,
        timers: &dyn TimerService,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut ctx = req.ctx;
        ctx.role = std::mem::take(&mut inner.role);
        let dst = ctx.addr;

        if !req.need_ack || !dst.is_unicast() {
            drop(inner);
            trace!(
                "Untracked send: model={}, dst={}, opcode={}, role={}",
                model,
                dst,
                req.opcode,
                ctx.role
            );
            return transport.send(model, &ctx, req.opcode, req.payload);
        }

        if inner.registry.contains(dst) {
            warn!("Client {} busy: request to {} outstanding", model, dst);
            return Err(MeshError::Busy { dst });
        }

        let expected = self.table.lookup(req.opcode).ok_or_else(|| {
            MeshError::InvalidArgument(format!("opcode {} has no paired status", req.opcode))
        })?;

        let timeout = match req.timeout {
            Some(t) if !t.is_zero() => t,
            _ => inner.default_timeout,
        };

        let mut txn = Transaction {
            id: self.next_txn.fetch_add(1, Ordering::Relaxed),
            model,
            ctx,
            opcode: req.opcode,
            expected,
            started: Instant::now(),
            timer: None,
        };
        txn.timer = Some(timers.start(txn.key(), timeout));

        if let Err(e) = transport.send(model, &ctx, req.opcode, req.payload) {
            txn.cancel_timer();
            warn!(
                "Send to {} failed, discarding transaction {}: {}",
                dst, txn.id, e
            );
            return Err(e);
        }

        debug!(
            "Tracking txn {}: model={}, dst={}, opcode={}, expect={}, timeout={:?}",
            txn.id, model, dst, req.opcode, expected, timeout
        );
        inner.registry.insert(txn);
        Ok(())
    }

    /// Offer an inbound message for correlation
    pub fn on_receive(&self, ctx: &MsgContext, opcode: Opcode) -> Outcome {
        if !ctx.recv_dst.is_unicast() {
            return Outcome::Unsolicited;
        }

        let mut inner = self.inner.lock();
        match inner.registry.get(ctx.addr) {
            Some(txn) if txn.expected == opcode => {}
            _ => return Outcome::Unsolicited,
        }

        match inner.registry.remove(ctx.addr) {
            Some(mut txn) => {
                txn.cancel_timer();
                debug!(
                    "Matched txn {}: src={}, opcode={}, after {:?}",
                    txn.id,
                    ctx.addr,
                    opcode,
                    txn.elapsed()
                );
                Outcome::Matched(txn)
            }
            None => Outcome::Unsolicited,
        }
    }

    /// Finalize a transaction whose timer expired
    ///
    /// Returns `None` when the transaction already completed, which is the
    /// normal result for a timer that raced a matching response.
    pub fn on_timeout(&self, key: &TimerKey) -> Option<Transaction> {
        let mut inner = self.inner.lock();
        let txn = inner.registry.remove_if(key.dst, key.txn);
        match &txn {
            Some(t) => debug!("Txn {} to {} timed out ({})", t.id, t.dst(), t.opcode),
            None => trace!("Stale timer {} ignored", key),
        }
        txn
    }

    /// Whether a transaction to `dst` is outstanding
    pub fn pending(&self, dst: Address) -> bool {
        self.inner.lock().registry.contains(dst)
    }

    /// Number of outstanding transactions
    pub fn len(&self) -> usize {
        self.inner.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every outstanding transaction and cancel its timer; no events
    pub fn drain(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for mut txn in inner.registry.drain() {
            txn.cancel_timer();
            count += 1;
        }
        count
    }
}

impl fmt::Debug for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ClientState")
            .field("pairs", &self.table.len())
            .field("pending", &inner.registry.len())
            .field("role", &inner.role)
            .finish()
    }
}
