//! Provisioning calls and notifications
//!
//! The provisioning handshake itself lives below the transport. The stack only
//! forwards application requests ([`ProvCall`]) down to it and carries its
//! notifications ([`ProvEvent`]) back up to the application.

use blemesh_core::{Address, MeshError};
use std::fmt;
use uuid::Uuid;

/// Application request handled by the provisioning layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvCall {
    /// Add addresses to the proxy filter of the connected proxy server
    ProxyAddFilterAddr {
        /// NetKey index of the proxy connection
        net_idx: u16,
        /// Addresses to add
        addrs: Vec<Address>,
    },
    /// Remove addresses from the proxy filter
    ProxyRemoveFilterAddr {
        /// NetKey index of the proxy connection
        net_idx: u16,
        /// Addresses to remove
        addrs: Vec<Address>,
    },
    /// Store the composition data of a provisioned node
    StoreNodeCompData {
        /// Primary address of the node
        unicast: Address,
        /// Raw composition data page
        data: Vec<u8>,
    },
    /// Forget a provisioned node
    DeleteNode {
        /// Primary address of the node
        unicast: Address,
    },
}

impl ProvCall {
    /// Short name used in logs and completion events
    pub fn action(&self) -> ProvAction {
        match self {
            ProvCall::ProxyAddFilterAddr { .. } => ProvAction::ProxyAddFilterAddr,
            ProvCall::ProxyRemoveFilterAddr { .. } => ProvAction::ProxyRemoveFilterAddr,
            ProvCall::StoreNodeCompData { .. } => ProvAction::StoreNodeCompData,
            ProvCall::DeleteNode { .. } => ProvAction::DeleteNode,
        }
    }
}

/// Kind of a [`ProvCall`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvAction {
    ProxyAddFilterAddr,
    ProxyRemoveFilterAddr,
    StoreNodeCompData,
    DeleteNode,
}

impl fmt::Display for ProvAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvAction::ProxyAddFilterAddr => "proxy_add_filter_addr",
            ProvAction::ProxyRemoveFilterAddr => "proxy_remove_filter_addr",
            ProvAction::StoreNodeCompData => "store_node_comp_data",
            ProvAction::DeleteNode => "delete_node",
        };
        f.write_str(name)
    }
}

/// Provisioning bearer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bearer {
    Adv,
    Gatt,
}

/// Notification from the provisioning layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvEvent {
    /// Provisioning link opened
    LinkOpen { bearer: Bearer },
    /// Provisioning link closed
    LinkClose { bearer: Bearer, reason: u8 },
    /// This node was provisioned
    Complete {
        net_idx: u16,
        addr: Address,
        flags: u8,
        iv_index: u32,
    },
    /// This node was reset
    Reset,
    /// Provisioner finished provisioning a device
    DeviceProvisioned {
        uuid: Uuid,
        unicast: Address,
        element_count: u8,
        net_idx: u16,
    },
    /// Provisioner saw an unprovisioned device beacon
    UnprovisionedBeacon {
        uuid: Uuid,
        bd_addr: [u8; 6],
        oob_info: u16,
        rssi: i8,
        /// Advertising data as received
        adv_data: Vec<u8>,
    },
    /// A [`ProvCall`] finished
    CallComplete {
        action: ProvAction,
        result: Result<(), MeshError>,
    },
}

impl ProvEvent {
    /// Short name used in logs and envelopes
    pub fn name(&self) -> &'static str {
        match self {
            ProvEvent::LinkOpen { .. } => "link_open",
            ProvEvent::LinkClose { .. } => "link_close",
            ProvEvent::Complete { .. } => "complete",
            ProvEvent::Reset => "reset",
            ProvEvent::DeviceProvisioned { .. } => "device_provisioned",
            ProvEvent::UnprovisionedBeacon { .. } => "unprovisioned_beacon",
            ProvEvent::CallComplete { .. } => "call_complete",
        }
    }
}
