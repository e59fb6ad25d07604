//! BLE Mesh Bridge - Cross-context dispatch and the processing runtime
//!
//! Application code never touches stack state directly. It talks to a single
//! processing task through a bounded call queue, and hears back through a
//! bounded event queue:
//!
//! ```text
//!  caller context          processing context          application context
//!  StackHandle ──Call──▶  MeshStack::run  ──Event──▶  EventDelivery::run
//!                          │        ▲                      │
//!                          ▼        │                      ▼
//!                        MeshTransport              CallbackRegistry
//! ```
//!
//! - [`envelope`] - Call and event payloads, tagged with domain, subsystem and action
//! - [`copy`] - Deep copy of borrowed caller data into owned payloads
//! - [`dispatch`] - Non-blocking bounded queue between contexts
//! - [`delivery`] - Per-stack callback registry and the application consume loop
//! - [`timers`] - Tokio-backed transaction timers
//! - [`stack`] - The processing loop and its caller handle
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use blemesh_bridge::{CallbackRegistry, ClientCallbacks, MeshStack, ReceivedMessage};
//! use blemesh_core::{Address, MsgContext, Opcode, StackConfig};
//! use blemesh_models::test_utils::MockTransport;
//! use blemesh_models::{Composition, Element, Model, ModelId, Request, Subsystem};
//!
//! struct Printer;
//!
//! impl ClientCallbacks for Printer {
//!     fn on_matched(&self, request: Opcode, message: &ReceivedMessage) {
//!         println!("{} answered with {}", request, message.opcode);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> blemesh_core::Result<()> {
//!     let registry = CallbackRegistry::new();
//!     registry.register_client(Subsystem::GenericClient, Arc::new(Printer))?;
//!
//!     let composition = Composition::new()
//!         .with_element(Element::new(0).with_model(Model::generic_onoff_client()))?;
//!     let (stack, handle, delivery) =
//!         MeshStack::new(StackConfig::default(), composition, MockTransport::new(), registry)?;
//!     tokio::spawn(stack.run());
//!     tokio::spawn(delivery.run());
//!
//!     let get = Request::new(MsgContext::to(Address::new(0x0010)), Opcode::two(0x82, 0x01), &[]);
//!     handle.send_request(ModelId::new(0, 0), &get).await?;
//!     handle.shutdown().await
//! }
//! ```

pub mod copy;
pub mod delivery;
pub mod dispatch;
pub mod envelope;
pub mod stack;
pub mod timers;

pub use copy::{CopyScope, DeepCopier};
pub use delivery::{CallbackRegistry, ClientCallbacks, EventDelivery, ModelCallbacks, ProvCallbacks};
pub use dispatch::{channel, BridgeReceiver, BridgeSender};
pub use envelope::{
    Call, ClientEvent, Domain, Envelope, Event, ModelEvent, Payload, ReceivedMessage, SendComplete,
    TimeoutNotice,
};
pub use stack::{MeshStack, StackHandle, StackStats};
pub use timers::TokioTimers;
