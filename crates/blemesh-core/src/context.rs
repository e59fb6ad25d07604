//! Message context
//!
//! [`MsgContext`] travels with every access message. For outbound messages
//! `addr` is the destination; for inbound messages it is the source and
//! `recv_dst` holds the address the message was sent to.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::role::Role;

/// Use the node's default TTL
pub const TTL_DEFAULT: u8 = 0xFF;

/// Key indices, addressing and radio metadata for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgContext {
    /// NetKey index
    pub net_idx: u16,
    /// AppKey index
    pub app_idx: u16,
    /// Destination when sending, source when receiving
    pub addr: Address,
    /// Destination of a received message
    pub recv_dst: Address,
    /// TTL of a received message
    pub recv_ttl: u8,
    /// RSSI of a received message
    pub recv_rssi: i8,
    /// TTL for sending
    pub send_ttl: u8,
    /// Force segment acknowledgements
    pub send_rel: bool,
    /// Sender identity for this send; read by lower layers to pick source
    /// address and keys
    pub role: Role,
}

impl Default for MsgContext {
    fn default() -> Self {
        Self {
            net_idx: 0,
            app_idx: 0,
            addr: Address::UNASSIGNED,
            recv_dst: Address::UNASSIGNED,
            recv_ttl: 0,
            recv_rssi: 0,
            send_ttl: TTL_DEFAULT,
            send_rel: false,
            role: Role::Node,
        }
    }
}

impl MsgContext {
    /// Outbound context for `dst`
    pub fn to(dst: Address) -> Self {
        Self {
            addr: dst,
            ..Self::default()
        }
    }

    /// Inbound context: `src` sent a message to `dst`
    pub fn received(src: Address, dst: Address) -> Self {
        Self {
            addr: src,
            recv_dst: dst,
            ..Self::default()
        }
    }

    pub fn with_net_idx(mut self, net_idx: u16) -> Self {
        self.net_idx = net_idx;
        self
    }

    pub fn with_app_idx(mut self, app_idx: u16) -> Self {
        self.app_idx = app_idx;
        self
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.send_ttl = ttl;
        self
    }

    pub fn with_rssi(mut self, rssi: i8) -> Self {
        self.recv_rssi = rssi;
        self
    }

    pub fn reliable(mut self) -> Self {
        self.send_rel = true;
        self
    }
}
