//! BLE Mesh Models - Client transaction tracking and model registry
//!
//! This crate implements the parts of the stack that run inside the single
//! processing context:
//!
//! - [`op_pair`] - Request/status opcode tables for the standard client models
//! - [`model`] - Model instances, elements and the node composition
//! - [`client`] - Per-client transaction registry, correlation and role selection
//! - [`timer`] - Transaction timer abstraction
//! - [`transport`] - The lower-layer collaborator interface
//! - [`prov`] - Provisioning calls and notifications passed through the stack
//!
//! # Example
//!
//! ```rust
//! use blemesh_core::{Address, MsgContext, Opcode};
//! use blemesh_models::client::{Outcome, Request};
//! use blemesh_models::test_utils::{ManualTimers, MockTransport};
//! use blemesh_models::{Composition, Element, Model, ModelId};
//!
//! let comp = Composition::new()
//!     .with_element(Element::new(0).with_model(Model::generic_onoff_client()))
//!     .unwrap();
//! let onoff = ModelId::new(0, 0);
//! let client = comp.client(onoff).unwrap();
//!
//! let mut transport = MockTransport::new();
//! let timers = ManualTimers::new();
//! let get = Request::new(MsgContext::to(Address::new(0x0010)), Opcode::two(0x82, 0x01), &[]);
//! client.send_request(onoff, &get, &mut transport, &timers).unwrap();
//!
//! let status = MsgContext::received(Address::new(0x0010), Address::new(0x0001));
//! assert!(matches!(client.on_receive(&status, Opcode::two(0x82, 0x04)), Outcome::Matched(_)));
//! ```

pub mod client;
pub mod model;
pub mod op_pair;
pub mod prov;
pub mod timer;
pub mod transport;

pub mod test_utils;

pub use client::{ClientState, Outcome, Request, Transaction, TransactionRegistry};
pub use model::{sig, Composition, Element, Model, ModelId, ModelIdentifier, ModelKind, Subsystem};
pub use op_pair::{OpcodePair, OpcodePairTable};
pub use prov::{Bearer, ProvAction, ProvCall, ProvEvent};
pub use timer::{TimerHandle, TimerKey, TimerService, TxnId};
pub use transport::{InboundMessage, LowerEvent, MeshTransport};

pub use test_utils::{ManualTimers, MockTransport, MockTransportHandle, SentMessage};
