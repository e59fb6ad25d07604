//! Event delivery to application callbacks
//!
//! Callbacks are registered per [`Subsystem`] in a [`CallbackRegistry`] that
//! belongs to one stack instance. The processing context consults the registry
//! before posting and skips events nobody listens for. [`EventDelivery`] is the
//! application-side consume loop that calls the registered callbacks.

use blemesh_core::{MeshError, Opcode, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use blemesh_models::{ModelId, ProvEvent, Subsystem};

use crate::dispatch::BridgeReceiver;
use crate::envelope::{
    ClientEvent, Envelope, Event, ModelEvent, ReceivedMessage, SendComplete, TimeoutNotice,
};

/// Callbacks for a client subsystem
///
/// Each tracked request ends in exactly one of `on_matched` or `on_timeout`
/// (or a failed `on_send_complete`); inbound messages that answer nothing go to
/// `on_unsolicited`.
pub trait ClientCallbacks: Send + Sync {
    fn on_matched(&self, _request: Opcode, _message: &ReceivedMessage) {}

    fn on_unsolicited(&self, _message: &ReceivedMessage) {}

    fn on_timeout(&self, _notice: &TimeoutNotice) {}

    fn on_send_complete(&self, _complete: &SendComplete) {}
}

/// Callbacks for server and user-defined models
pub trait ModelCallbacks: Send + Sync {
    fn on_operation(&self, _message: &ReceivedMessage) {}

    fn on_send_complete(&self, _complete: &SendComplete) {}

    fn on_publish_complete(&self, _model: ModelId, _opcode: Opcode, _result: &Result<()>) {}
}

/// Callbacks for provisioning notifications
pub trait ProvCallbacks: Send + Sync {
    fn on_prov_event(&self, event: &ProvEvent);
}

#[derive(Clone)]
enum Handler {
    Client(Arc<dyn ClientCallbacks>),
    Model(Arc<dyn ModelCallbacks>),
    Prov(Arc<dyn ProvCallbacks>),
}

/// Per-stack subsystem-to-callback map
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    handlers: Arc<RwLock<HashMap<Subsystem, Handler>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register callbacks for a client subsystem, replacing any previous ones
    pub fn register_client(
        &self,
        subsystem: Subsystem,
        callbacks: Arc<dyn ClientCallbacks>,
    ) -> Result<()> {
        if matches!(subsystem, Subsystem::Prov | Subsystem::Model) {
            return Err(MeshError::InvalidArgument(format!(
                "{} is not a client subsystem",
                subsystem
            )));
        }
        self.insert(subsystem, Handler::Client(callbacks));
        Ok(())
    }

    /// Register callbacks for server and user-defined models
    pub fn register_model(&self, callbacks: Arc<dyn ModelCallbacks>) {
        self.insert(Subsystem::Model, Handler::Model(callbacks));
    }

    /// Register callbacks for provisioning notifications
    pub fn register_prov(&self, callbacks: Arc<dyn ProvCallbacks>) {
        self.insert(Subsystem::Prov, Handler::Prov(callbacks));
    }

    /// Remove a subsystem's callbacks; returns whether any were registered
    pub fn unregister(&self, subsystem: Subsystem) -> bool {
        self.handlers.write().remove(&subsystem).is_some()
    }

    pub fn is_registered(&self, subsystem: Subsystem) -> bool {
        self.handlers.read().contains_key(&subsystem)
    }

    fn insert(&self, subsystem: Subsystem, handler: Handler) {
        if self.handlers.write().insert(subsystem, handler).is_some() {
            debug!("Replaced callbacks for {}", subsystem);
        }
    }

    /// Invoke the callback for one envelope; returns whether one ran
    pub fn deliver(&self, envelope: Envelope<Event>) -> bool {
        let subsystem = envelope.subsystem();
        // clone out so callbacks run without the lock held
        let handler = match self.handlers.read().get(&subsystem) {
            Some(handler) => handler.clone(),
            None => {
                trace!("No callbacks for {}, dropping {}", subsystem, envelope.action());
                return false;
            }
        };

        match (handler, envelope.into_payload()) {
            (Handler::Client(cb), Event::Client { event, .. }) => match event {
                ClientEvent::Matched { request, message } => cb.on_matched(request, &message),
                ClientEvent::Unsolicited(message) => cb.on_unsolicited(&message),
                ClientEvent::Timeout(notice) => cb.on_timeout(&notice),
                ClientEvent::SendComplete(complete) => cb.on_send_complete(&complete),
            },
            (Handler::Model(cb), Event::Model(event)) => match event {
                ModelEvent::Operation(message) => cb.on_operation(&message),
                ModelEvent::SendComplete(complete) => cb.on_send_complete(&complete),
                ModelEvent::PublishComplete {
                    model,
                    opcode,
                    result,
                } => cb.on_publish_complete(model, opcode, &result),
            },
            (Handler::Prov(cb), Event::Prov(event)) => cb.on_prov_event(&event),
            (_, event) => {
                warn!("Callbacks for {} cannot take {:?}", subsystem, event);
                return false;
            }
        }
        true
    }
}

/// Application-context consume loop
pub struct EventDelivery {
    rx: BridgeReceiver<Event>,
    registry: CallbackRegistry,
}

impl EventDelivery {
    pub fn new(rx: BridgeReceiver<Event>, registry: CallbackRegistry) -> Self {
        Self { rx, registry }
    }

    /// Deliver events until the stack stops; returns how many were consumed
    pub async fn run(self) -> u64 {
        let registry = self.registry;
        let delivered = self
            .rx
            .run(|envelope| {
                registry.deliver(envelope);
            })
            .await;
        info!("Event delivery stopped after {} events", delivered);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blemesh_core::{Address, MsgContext};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl ClientCallbacks for Recorder {
        fn on_matched(&self, request: Opcode, message: &ReceivedMessage) {
            self.calls
                .lock()
                .push(format!("matched {} -> {}", request, message.opcode));
        }

        fn on_timeout(&self, notice: &TimeoutNotice) {
            self.calls.lock().push(format!("timeout {}", notice.opcode));
        }
    }

    fn timeout_event(subsystem: Subsystem) -> Envelope<Event> {
        Envelope::new(Event::Client {
            subsystem,
            event: ClientEvent::Timeout(TimeoutNotice {
                model: ModelId::new(0, 0),
                ctx: MsgContext::to(Address::new(0x0010)),
                opcode: Opcode::two(0x82, 0x01),
            }),
        })
    }

    #[test]
    fn test_registries_are_independent() {
        let a = CallbackRegistry::new();
        let b = CallbackRegistry::new();
        a.register_client(Subsystem::GenericClient, Arc::new(Recorder::default()))
            .unwrap();

        assert!(a.is_registered(Subsystem::GenericClient));
        assert!(!b.is_registered(Subsystem::GenericClient));
    }

    #[test]
    fn test_deliver_to_registered_client() {
        let registry = CallbackRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry
            .register_client(Subsystem::GenericClient, recorder.clone())
            .unwrap();

        assert!(registry.deliver(timeout_event(Subsystem::GenericClient)));
        assert!(!registry.deliver(timeout_event(Subsystem::LightingClient)));

        assert_eq!(recorder.calls.lock().as_slice(), ["timeout 0x8201"]);
    }

    #[test]
    fn test_client_callbacks_need_client_subsystem() {
        let registry = CallbackRegistry::new();
        assert!(registry
            .register_client(Subsystem::Prov, Arc::new(Recorder::default()))
            .is_err());
    }

    #[test]
    fn test_unregister() {
        let registry = CallbackRegistry::new();
        registry
            .register_client(Subsystem::SensorClient, Arc::new(Recorder::default()))
            .unwrap();
        assert!(registry.unregister(Subsystem::SensorClient));
        assert!(!registry.unregister(Subsystem::SensorClient));
        assert!(!registry.is_registered(Subsystem::SensorClient));
    }
}
