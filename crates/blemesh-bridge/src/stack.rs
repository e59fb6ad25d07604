//! Processing-context runtime
//!
//! [`MeshStack`] owns the composition, the transport and every transaction
//! registry. It runs as a single task; callers reach it only through a
//! [`StackHandle`], and it reaches the application only through the event
//! queue consumed by [`EventDelivery`].
//!
//! Events that end a transaction (`Matched`, `Timeout`) are never dropped for
//! lack of queue space: when the queue is full they wait in a backlog, and
//! every other event is discarded until the backlog has drained.

use std::collections::VecDeque;

use blemesh_core::{Address, CopyPolicy, MeshError, MsgContext, Opcode, Result, Role, StackConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use blemesh_models::{
    Composition, InboundMessage, LowerEvent, MeshTransport, ModelId, Outcome, ProvCall, ProvEvent,
    Request, Subsystem, TimerKey,
};

use crate::copy::{CopyScope, DeepCopier};
use crate::delivery::{CallbackRegistry, EventDelivery};
use crate::dispatch::{self, BridgeReceiver, BridgeSender};
use crate::envelope::{
    Call, ClientEvent, ClientSend, Envelope, Event, ModelEvent, ModelPublish, Payload,
    ReceivedMessage, SendComplete, ServerSend, TimeoutNotice,
};
use crate::timers::TokioTimers;

/// Stack statistics
#[derive(Debug, Clone, Default)]
pub struct StackStats {
    /// Calls taken off the call queue
    pub calls: u64,
    /// Client requests handed to the transport
    pub requests_sent: u64,
    /// Client requests refused because a transaction was outstanding
    pub busy: u64,
    /// Transport send, publish or receive errors
    pub transport_failures: u64,
    /// Statuses that completed a transaction
    pub matched: u64,
    /// Client messages that answered nothing
    pub unsolicited: u64,
    /// Transactions finalized by their timer
    pub timeouts: u64,
    /// Inbound messages for server models
    pub operations: u64,
    /// Notifications from the provisioning layer
    pub prov_events: u64,
    /// Events queued for the application
    pub events_posted: u64,
    /// Events dropped because nobody registered for them
    pub events_skipped: u64,
    /// Events lost to a full or closed event queue
    pub event_dispatch_failures: u64,
    /// Terminal events that had to wait for queue space
    pub events_backlogged: u64,
    /// Events lost because a field could not be copied
    pub copy_failures: u64,
    /// Events delivered with an emptied field
    pub degraded_copies: u64,
}

/// Handle for calling into a running [`MeshStack`]
#[derive(Clone)]
pub struct StackHandle {
    calls: BridgeSender<Call>,
    copier: DeepCopier,
}

impl StackHandle {
    /// Send a client request with whatever role the client has selected
    ///
    /// Resolves once the request was handed to the transport (or refused). The
    /// status, or the timeout, arrives later through the client's callbacks.
    pub async fn send_request(&self, model: ModelId, req: &Request<'_>) -> Result<()> {
        self.client_send(model, req, None).await
    }

    /// Send a client request in `role`
    pub async fn send_request_as(
        &self,
        model: ModelId,
        req: &Request<'_>,
        role: Role,
    ) -> Result<()> {
        self.client_send(model, req, Some(role)).await
    }

    async fn client_send(
        &self,
        model: ModelId,
        req: &Request<'_>,
        role: Option<Role>,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.calls.submit_with(&self.copier, |scope| {
            Ok(Call::ClientSend(ClientSend {
                model,
                ctx: req.ctx,
                opcode: req.opcode,
                payload: scope.bytes("payload", req.payload)?,
                timeout: req.timeout,
                need_ack: req.need_ack,
                role,
                reply: Some(tx),
            }))
        })?;
        rx.await.map_err(|_| MeshError::ChannelClosed)?
    }

    /// Select the role for the client's next send
    pub async fn set_role(&self, model: ModelId, role: Role) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.calls.submit(Call::SetRole {
            model,
            role,
            reply: tx,
        })?;
        rx.await.map_err(|_| MeshError::ChannelClosed)?
    }

    /// Publish on the model's publication address
    pub async fn publish(
        &self,
        model: ModelId,
        opcode: Opcode,
        payload: &[u8],
        role: Role,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.calls.submit_with(&self.copier, |scope| {
            Ok(Call::ModelPublish(ModelPublish {
                model,
                opcode,
                payload: scope.bytes("payload", payload)?,
                role,
                reply: Some(tx),
            }))
        })?;
        rx.await.map_err(|_| MeshError::ChannelClosed)?
    }

    /// Send a server model message
    pub async fn server_send(
        &self,
        model: ModelId,
        ctx: MsgContext,
        opcode: Opcode,
        payload: &[u8],
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.calls.submit_with(&self.copier, |scope| {
            Ok(Call::ServerSend(ServerSend {
                model,
                ctx,
                opcode,
                payload: scope.bytes("payload", payload)?,
                reply: Some(tx),
            }))
        })?;
        rx.await.map_err(|_| MeshError::ChannelClosed)?
    }

    /// Queue a provisioning request; completion arrives as `ProvEvent::CallComplete`
    pub fn prov_call(&self, call: ProvCall) -> Result<()> {
        self.calls.submit(Call::Prov(call))
    }

    pub fn proxy_add_filter_addr(&self, net_idx: u16, addrs: &[Address]) -> Result<()> {
        self.calls.submit_with(&self.copier, |scope| {
            Ok(Call::Prov(ProvCall::ProxyAddFilterAddr {
                net_idx,
                addrs: scope.slice("addrs", addrs)?,
            }))
        })
    }

    pub fn proxy_remove_filter_addr(&self, net_idx: u16, addrs: &[Address]) -> Result<()> {
        self.calls.submit_with(&self.copier, |scope| {
            Ok(Call::Prov(ProvCall::ProxyRemoveFilterAddr {
                net_idx,
                addrs: scope.slice("addrs", addrs)?,
            }))
        })
    }

    pub fn store_node_comp_data(&self, unicast: Address, data: &[u8]) -> Result<()> {
        self.calls.submit_with(&self.copier, |scope| {
            Ok(Call::Prov(ProvCall::StoreNodeCompData {
                unicast,
                data: scope.bytes("data", data)?,
            }))
        })
    }

    pub fn delete_node(&self, unicast: Address) -> Result<()> {
        self.prov_call(ProvCall::DeleteNode { unicast })
    }

    /// Get stack statistics
    pub async fn stats(&self) -> Result<StackStats> {
        let (tx, rx) = oneshot::channel();
        self.calls.submit_wait(Call::GetStats(tx)).await?;
        rx.await.map_err(|_| MeshError::ChannelClosed)
    }

    /// Stop the stack; outstanding transactions are dropped without events
    pub async fn shutdown(&self) -> Result<()> {
        self.calls.submit_wait(Call::Shutdown).await
    }
}

/// Single-task owner of all mutable stack state
pub struct MeshStack<T: MeshTransport> {
    config: StackConfig,
    composition: Composition,
    transport: T,
    timers: TokioTimers,
    expired_rx: mpsc::UnboundedReceiver<TimerKey>,
    call_rx: BridgeReceiver<Call>,
    events: BridgeSender<Event>,
    /// Terminal events waiting for event queue space, oldest first
    backlog: VecDeque<Envelope<Event>>,
    registry: CallbackRegistry,
    copier: DeepCopier,
    stats: StackStats,
    /// Cleared once the transport reports it has shut down
    transport_open: bool,
}

impl<T: MeshTransport> MeshStack<T> {
    /// Create a stack with its caller handle and application delivery loop
    pub fn new(
        config: StackConfig,
        composition: Composition,
        transport: T,
        registry: CallbackRegistry,
    ) -> Result<(Self, StackHandle, EventDelivery)> {
        config.validate()?;

        for (_, client) in composition.clients() {
            client.set_default_timeout(config.client.default_timeout);
        }

        let (call_tx, call_rx) = dispatch::channel(config.bridge.call_queue_size);
        let (event_tx, event_rx) = dispatch::channel(config.bridge.event_queue_size);
        let (timers, expired_rx) = TokioTimers::new();
        let copier = DeepCopier::from_config(&config.copy);

        // an emptied request payload is never worth sending
        let handle = StackHandle {
            calls: call_tx,
            copier: DeepCopier::new(CopyPolicy::Reject, config.copy.max_field_len),
        };
        let delivery = EventDelivery::new(event_rx, registry.clone());

        let stack = Self {
            config,
            composition,
            transport,
            timers,
            expired_rx,
            call_rx,
            events: event_tx,
            backlog: VecDeque::new(),
            registry,
            copier,
            stats: StackStats::default(),
            transport_open: true,
        };

        Ok((stack, handle, delivery))
    }

    /// Run the processing loop until shutdown or until every handle is dropped
    pub async fn run(mut self) -> Result<()> {
        info!(
            "Starting mesh stack on {} ({} models)",
            self.transport.name(),
            self.composition.models().count()
        );

        loop {
            tokio::select! {
                lower = self.transport.recv(), if self.transport_open => {
                    match lower {
                        Ok(Some(event)) => self.handle_lower(event),
                        Ok(None) => {
                            info!("Transport {} shut down", self.transport.name());
                            self.transport_open = false;
                        }
                        Err(e) => {
                            warn!("Error reading from transport: {}", e);
                            self.stats.transport_failures += 1;
                        }
                    }
                }

                Some(key) = self.expired_rx.recv() => {
                    self.handle_timeout(key);
                }

                permit = self.events.reserve(), if !self.backlog.is_empty() => {
                    self.drain_backlog(permit);
                }

                call = self.call_rx.recv() => {
                    match call {
                        Some(envelope) => {
                            if !self.handle_call(envelope) {
                                info!("Mesh stack shutdown requested");
                                break;
                            }
                        }
                        None => {
                            info!("All stack handles dropped");
                            break;
                        }
                    }
                }
            }
        }

        let dropped: usize = self.composition.clients().map(|(_, c)| c.drain()).sum();
        while let Some(envelope) = self.backlog.pop_front() {
            self.submit(envelope);
        }
        info!(
            "Mesh stack stopped: {} calls, {} matched, {} timeouts, {} transactions dropped",
            self.stats.calls, self.stats.matched, self.stats.timeouts, dropped
        );
        Ok(())
    }

    /// Handle one call; returns false on shutdown
    fn handle_call(&mut self, envelope: Envelope<Call>) -> bool {
        self.stats.calls += 1;
        trace!("Handling {}/{}", envelope.subsystem(), envelope.action());

        match envelope.into_payload() {
            Call::ClientSend(send) => self.client_send(send),
            Call::SetRole { model, role, reply } => {
                let result = self
                    .composition
                    .client(model)
                    .and_then(|client| client.set_role(role, &self.config.capabilities));
                let _ = reply.send(result);
            }
            Call::ModelPublish(publish) => self.model_publish(publish),
            Call::ServerSend(send) => self.server_send(send),
            Call::Prov(call) => {
                let action = call.action();
                let result = self.transport.handle_prov(&call);
                if let Err(e) = &result {
                    warn!("Provisioning call {} failed: {}", action, e);
                }
                self.post(Event::Prov(ProvEvent::CallComplete { action, result }));
            }
            Call::GetStats(tx) => {
                let _ = tx.send(self.stats.clone());
            }
            Call::Shutdown => return false,
        }
        true
    }

    fn client_send(&mut self, send: ClientSend) {
        let ClientSend {
            model,
            ctx,
            opcode,
            payload,
            timeout,
            need_ack,
            role,
            reply,
        } = send;

        let req = Request {
            ctx,
            opcode,
            payload: &payload,
            timeout,
            need_ack,
        };
        let subsystem = self
            .composition
            .model(model)
            .ok()
            .filter(|m| m.is_client())
            .map(|m| m.subsystem());
        let result = self.send_request(model, &req, role);
        match &result {
            Ok(()) => self.stats.requests_sent += 1,
            Err(MeshError::Busy { .. }) => self.stats.busy += 1,
            Err(MeshError::TransportFailure(_)) => self.stats.transport_failures += 1,
            Err(e) => debug!("Client {} send refused: {}", model, e),
        }

        if let Some(subsystem) = subsystem {
            self.post(Event::Client {
                subsystem,
                event: ClientEvent::SendComplete(SendComplete {
                    model,
                    ctx,
                    opcode,
                    result: result.clone(),
                }),
            });
        }
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    fn send_request(
        &mut self,
        model: ModelId,
        req: &Request<'_>,
        role: Option<Role>,
    ) -> Result<()> {
        let client = self
            .composition
            .model(model)?
            .client_state()
            .cloned()
            .ok_or_else(|| MeshError::Unsupported(format!("model {} is not a client", model)))?;

        if let Some(role) = role {
            client.set_role(role, &self.config.capabilities)?;
        }
        client.send_request(model, req, &mut self.transport, &self.timers)
    }

    fn model_publish(&mut self, publish: ModelPublish) {
        let ModelPublish {
            model,
            opcode,
            payload,
            role,
            reply,
        } = publish;

        let result = if !self.config.capabilities.permits(role) {
            Err(MeshError::InvalidArgument(format!("role {} is not enabled", role)))
        } else {
            self.composition
                .model(model)
                .map(|_| ())
                .and_then(|_| self.transport.publish(model, role, opcode, &payload))
        };
        if let Err(MeshError::TransportFailure(_)) = &result {
            self.stats.transport_failures += 1;
        }

        self.post(Event::Model(ModelEvent::PublishComplete {
            model,
            opcode,
            result: result.clone(),
        }));
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    fn server_send(&mut self, send: ServerSend) {
        let ServerSend {
            model,
            ctx,
            opcode,
            payload,
            reply,
        } = send;

        let result = self
            .composition
            .model(model)
            .map(|_| ())
            .and_then(|_| self.transport.send(model, &ctx, opcode, &payload));
        if let Err(MeshError::TransportFailure(_)) = &result {
            self.stats.transport_failures += 1;
        }

        self.post(Event::Model(ModelEvent::SendComplete(SendComplete {
            model,
            ctx,
            opcode,
            result: result.clone(),
        })));
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    fn handle_lower(&mut self, event: LowerEvent) {
        match event {
            LowerEvent::Message(msg) => self.handle_inbound(msg),
            LowerEvent::Prov(event) => {
                self.stats.prov_events += 1;
                debug!("Provisioning event: {}", event.name());
                self.post_copied(Subsystem::Prov, |scope| copy_prov_event(scope, &event));
            }
        }
    }

    fn handle_inbound(&mut self, msg: InboundMessage) {
        let (subsystem, client) = match self.composition.model(msg.model) {
            Ok(model) => (model.subsystem(), model.client_state().cloned()),
            Err(e) => {
                warn!("Dropping {} from {}: {}", msg.opcode, msg.ctx.addr, e);
                return;
            }
        };

        let Some(client) = client else {
            self.stats.operations += 1;
            self.post_copied(Subsystem::Model, |scope| {
                Ok(Event::Model(ModelEvent::Operation(copy_message(scope, &msg)?)))
            });
            return;
        };

        // Copy before matching: a status that cannot be copied leaves its
        // transaction outstanding, to be finalized by the timer.
        let copied = if self.registry.is_registered(subsystem) {
            let mut scope = self.copier.scope();
            match copy_message(&mut scope, &msg) {
                Ok(message) => Some((message, scope.is_degraded())),
                Err(e) => {
                    error!("Dropped {} from {}: {}", msg.opcode, msg.ctx.addr, e);
                    self.stats.copy_failures += 1;
                    return;
                }
            }
        } else {
            None
        };

        let request = match client.on_receive(&msg.ctx, msg.opcode) {
            Outcome::Matched(txn) => {
                self.stats.matched += 1;
                Some(txn.opcode())
            }
            Outcome::Unsolicited => {
                self.stats.unsolicited += 1;
                trace!("Unsolicited {} from {} for {}", msg.opcode, msg.ctx.addr, msg.model);
                None
            }
        };

        let Some((message, degraded)) = copied else {
            trace!("No callbacks for {}, skipping {}", subsystem, msg.opcode);
            self.stats.events_skipped += 1;
            return;
        };
        let (event, terminal) = match request {
            Some(request) => (ClientEvent::Matched { request, message }, true),
            None => (ClientEvent::Unsolicited(message), false),
        };
        let envelope = Envelope::new(Event::Client { subsystem, event }).with_degraded(degraded);
        if terminal {
            self.post_terminal(envelope);
        } else {
            self.enqueue(envelope);
        }
    }

    fn handle_timeout(&mut self, key: TimerKey) {
        let (subsystem, client) = match self.composition.model(key.model) {
            Ok(model) => (model.subsystem(), model.client_state().cloned()),
            Err(_) => return,
        };
        let Some(txn) = client.and_then(|client| client.on_timeout(&key)) else {
            return;
        };

        self.stats.timeouts += 1;
        let event = Event::Client {
            subsystem,
            event: ClientEvent::Timeout(TimeoutNotice {
                model: txn.model(),
                ctx: *txn.ctx(),
                opcode: txn.opcode(),
            }),
        };
        if !self.registry.is_registered(subsystem) {
            trace!("No callbacks for {}, skipping {}", subsystem, event.action());
            self.stats.events_skipped += 1;
            return;
        }
        self.post_terminal(Envelope::new(event));
    }

    /// Post an event that already owns its data
    fn post(&mut self, event: Event) {
        let subsystem = event.subsystem();
        if !self.registry.is_registered(subsystem) {
            trace!("No callbacks for {}, skipping {}", subsystem, event.action());
            self.stats.events_skipped += 1;
            return;
        }
        self.enqueue(Envelope::new(event));
    }

    /// Post an event built from borrowed data
    fn post_copied<F>(&mut self, subsystem: Subsystem, build: F)
    where
        F: FnOnce(&mut CopyScope<'_>) -> Result<Event>,
    {
        if !self.registry.is_registered(subsystem) {
            trace!("No callbacks for {}, skipping event", subsystem);
            self.stats.events_skipped += 1;
            return;
        }

        let mut scope = self.copier.scope();
        match build(&mut scope) {
            Ok(event) => {
                let degraded = scope.is_degraded();
                self.enqueue(Envelope::new(event).with_degraded(degraded));
            }
            Err(e) => {
                error!("Dropped {} event: {}", subsystem, e);
                self.stats.copy_failures += 1;
            }
        }
    }

    /// Queue a non-terminal event, dropping it if there is no room for it
    fn enqueue(&mut self, envelope: Envelope<Event>) {
        if !self.backlog.is_empty() {
            warn!(
                "Event queue backlogged, dropping {}/{}",
                envelope.subsystem(),
                envelope.action()
            );
            self.stats.event_dispatch_failures += 1;
            return;
        }
        self.submit(envelope);
    }

    /// Queue an event that ends a transaction, holding it until there is room
    fn post_terminal(&mut self, envelope: Envelope<Event>) {
        if self.backlog.is_empty() && self.events.has_room() {
            self.submit(envelope);
            return;
        }
        debug!(
            "Event queue full, holding {}/{} ({} waiting)",
            envelope.subsystem(),
            envelope.action(),
            self.backlog.len()
        );
        self.stats.events_backlogged += 1;
        self.backlog.push_back(envelope);
    }

    /// Move the oldest backlogged event into the slot just reserved
    fn drain_backlog(&mut self, permit: Result<mpsc::OwnedPermit<Envelope<Event>>>) {
        let permit = match permit {
            Ok(permit) => permit,
            Err(_) => {
                let lost = self.backlog.len() as u64;
                error!("Event queue closed, {} terminal events lost", lost);
                self.backlog.clear();
                self.stats.event_dispatch_failures += lost;
                return;
            }
        };
        if let Some(envelope) = self.backlog.pop_front() {
            self.record_posted(envelope.is_degraded());
            permit.send(envelope);
        }
    }

    fn submit(&mut self, envelope: Envelope<Event>) {
        let degraded = envelope.is_degraded();
        match self.events.submit_envelope(envelope) {
            Ok(()) => self.record_posted(degraded),
            Err(_) => self.stats.event_dispatch_failures += 1,
        }
    }

    fn record_posted(&mut self, degraded: bool) {
        self.stats.events_posted += 1;
        if degraded {
            self.stats.degraded_copies += 1;
        }
    }
}

fn copy_message(scope: &mut CopyScope<'_>, msg: &InboundMessage) -> Result<ReceivedMessage> {
    let payload = scope.bytes("payload", &msg.payload)?;
    Ok(ReceivedMessage {
        model: msg.model,
        ctx: msg.ctx,
        opcode: msg.opcode,
        payload,
        degraded: scope.is_degraded(),
    })
}

fn copy_prov_event(scope: &mut CopyScope<'_>, event: &ProvEvent) -> Result<Event> {
    let event = match event {
        ProvEvent::UnprovisionedBeacon {
            uuid,
            bd_addr,
            oob_info,
            rssi,
            adv_data,
        } => ProvEvent::UnprovisionedBeacon {
            uuid: *uuid,
            bd_addr: *bd_addr,
            oob_info: *oob_info,
            rssi: *rssi,
            adv_data: scope.bytes("adv_data", adv_data)?,
        },
        other => other.clone(),
    };
    Ok(Event::Prov(event))
}
