//! BLE Mesh Core - Shared types for the mesh model stack
//!
//! This crate holds the vocabulary every other crate in the workspace speaks:
//!
//! - [`address`] - Unicast, group and virtual mesh addresses
//! - [`opcode`] - 1/2/3-octet access opcodes and their wire codec
//! - [`access`] - Access PDU framing
//! - [`context`] - Per-message context (keys, addressing, sender role)
//! - [`role`] - Sender identities and build capabilities
//! - [`config`] - Stack configuration
//! - [`error`] - The shared error type
//!
//! # Example
//!
//! ```rust
//! use blemesh_core::{Address, MsgContext, Opcode};
//!
//! let get = Opcode::two(0x82, 0x01);
//! let ctx = MsgContext::to(Address::new(0x0010)).with_app_idx(0);
//! assert!(ctx.addr.is_unicast());
//! assert_eq!(get.wire_len(), 2);
//! ```

pub mod access;
pub mod address;
pub mod config;
pub mod context;
pub mod error;
pub mod opcode;
pub mod role;

pub use access::{decode_access, encode_access, MAX_ACCESS_PAYLOAD};
pub use address::Address;
pub use config::{
    BridgeConfig, ClientConfig, CopyConfig, CopyPolicy, StackConfig, StackConfigBuilder,
    DEFAULT_CLIENT_TIMEOUT_MS, DEFAULT_MAX_FIELD_LEN, DEFAULT_QUEUE_SIZE,
};
pub use context::{MsgContext, TTL_DEFAULT};
pub use error::{MeshError, Result};
pub use opcode::Opcode;
pub use role::{Capabilities, Role};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
