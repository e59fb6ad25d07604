//! Cross-context messages
//!
//! Everything that crosses between the caller context and the processing context
//! travels as an [`Envelope`]. Calls flow in, events flow out. Every payload
//! variant owns its data outright, so consuming an envelope and dropping it is
//! the whole cleanup story.

use blemesh_core::{MsgContext, Opcode, Result, Role};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

use blemesh_models::{ModelId, ProvCall, ProvEvent, Subsystem};

use crate::stack::StackStats;

/// Direction of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Caller context to processing context
    Call,
    /// Processing context to application context
    Event,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Call => f.write_str("call"),
            Domain::Event => f.write_str("event"),
        }
    }
}

/// Anything that can ride in an [`Envelope`]
pub trait Payload: Send + 'static {
    /// Direction this payload travels
    const DOMAIN: Domain;

    /// Subsystem that handles it
    fn subsystem(&self) -> Subsystem;

    /// Action name within the subsystem
    fn action(&self) -> &'static str;
}

/// One message between contexts, consumed exactly once
pub struct Envelope<P> {
    domain: Domain,
    subsystem: Subsystem,
    action: &'static str,
    degraded: bool,
    payload: P,
}

impl<P: Payload> Envelope<P> {
    pub fn new(payload: P) -> Self {
        Self {
            domain: P::DOMAIN,
            subsystem: payload.subsystem(),
            action: payload.action(),
            degraded: false,
            payload,
        }
    }

    /// Mark that a nested field was delivered empty
    pub fn with_degraded(mut self, degraded: bool) -> Self {
        self.degraded = degraded;
        self
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    pub fn action(&self) -> &'static str {
        self.action
    }

    /// Whether some nested field failed to copy and was left empty
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

impl<P> fmt::Debug for Envelope<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("domain", &self.domain)
            .field("subsystem", &self.subsystem)
            .field("action", &self.action)
            .field("degraded", &self.degraded)
            .finish()
    }
}

// ============================================================================
// Calls
// ============================================================================

/// Reply slot for calls the caller waits on
pub type Reply<T> = oneshot::Sender<Result<T>>;

/// Client request, owned copy of the caller's [`blemesh_models::Request`]
#[derive(Debug)]
pub struct ClientSend {
    pub model: ModelId,
    pub ctx: MsgContext,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    pub timeout: Option<Duration>,
    pub need_ack: bool,
    /// Role for this send; `None` keeps whatever `set_role` selected
    pub role: Option<Role>,
    pub reply: Option<Reply<()>>,
}

/// Publication on a model's publish address
#[derive(Debug)]
pub struct ModelPublish {
    pub model: ModelId,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    pub role: Role,
    pub reply: Option<Reply<()>>,
}

/// Server model response or unsolicited server message
#[derive(Debug)]
pub struct ServerSend {
    pub model: ModelId,
    pub ctx: MsgContext,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    pub reply: Option<Reply<()>>,
}

/// Requests into the processing context
#[derive(Debug)]
pub enum Call {
    ClientSend(ClientSend),
    ModelPublish(ModelPublish),
    ServerSend(ServerSend),
    SetRole {
        model: ModelId,
        role: Role,
        reply: Reply<()>,
    },
    Prov(ProvCall),
    GetStats(oneshot::Sender<StackStats>),
    Shutdown,
}

impl Payload for Call {
    const DOMAIN: Domain = Domain::Call;

    fn subsystem(&self) -> Subsystem {
        match self {
            Call::Prov(_) => Subsystem::Prov,
            _ => Subsystem::Model,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Call::ClientSend(_) => "client_send",
            Call::ModelPublish(_) => "model_publish",
            Call::ServerSend(_) => "server_send",
            Call::SetRole { .. } => "set_role",
            Call::Prov(call) => match call {
                ProvCall::ProxyAddFilterAddr { .. } => "proxy_add_filter_addr",
                ProvCall::ProxyRemoveFilterAddr { .. } => "proxy_remove_filter_addr",
                ProvCall::StoreNodeCompData { .. } => "store_node_comp_data",
                ProvCall::DeleteNode { .. } => "delete_node",
            },
            Call::GetStats(_) => "get_stats",
            Call::Shutdown => "shutdown",
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Access message delivered to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub model: ModelId,
    /// Source in `addr`, destination in `recv_dst`
    pub ctx: MsgContext,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    /// `payload` could not be copied and is empty
    pub degraded: bool,
}

/// A tracked request got no status in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutNotice {
    pub model: ModelId,
    /// Context the request was sent with
    pub ctx: MsgContext,
    /// Request opcode
    pub opcode: Opcode,
}

/// Outcome of handing a message to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendComplete {
    pub model: ModelId,
    pub ctx: MsgContext,
    pub opcode: Opcode,
    pub result: Result<()>,
}

/// Terminal outcomes for client models
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Status answering a tracked request
    Matched {
        /// Opcode of the request it answered
        request: Opcode,
        message: ReceivedMessage,
    },
    /// Message no tracked request was waiting for
    Unsolicited(ReceivedMessage),
    Timeout(TimeoutNotice),
    SendComplete(SendComplete),
}

/// Notifications for server and user-defined models
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// Inbound message for a server model
    Operation(ReceivedMessage),
    SendComplete(SendComplete),
    PublishComplete {
        model: ModelId,
        opcode: Opcode,
        result: Result<()>,
    },
}

/// Notifications out of the processing context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Client {
        subsystem: Subsystem,
        event: ClientEvent,
    },
    Model(ModelEvent),
    Prov(ProvEvent),
}

impl Payload for Event {
    const DOMAIN: Domain = Domain::Event;

    fn subsystem(&self) -> Subsystem {
        match self {
            Event::Client { subsystem, .. } => *subsystem,
            Event::Model(_) => Subsystem::Model,
            Event::Prov(_) => Subsystem::Prov,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Event::Client { event, .. } => match event {
                ClientEvent::Matched { .. } => "matched",
                ClientEvent::Unsolicited(_) => "unsolicited",
                ClientEvent::Timeout(_) => "timeout",
                ClientEvent::SendComplete(_) => "send_complete",
            },
            Event::Model(event) => match event {
                ModelEvent::Operation(_) => "operation",
                ModelEvent::SendComplete(_) => "send_complete",
                ModelEvent::PublishComplete { .. } => "publish_complete",
            },
            Event::Prov(event) => event.name(),
        }
    }
}
