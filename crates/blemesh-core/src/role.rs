//! Sender identities
//!
//! A single model instance can be driven by more than one logical sender, e.g.
//! a fast-provisioning flow uses the same client model as a provisioned node and
//! as a transient provisioner. The [`Role`] picks which identity one send uses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical sender identity for one send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Provisioned node
    #[default]
    Node,
    /// Provisioner
    Provisioner,
    /// Fast-provisioning server acting as a temporary provisioner
    FastProvisioner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Node => write!(f, "node"),
            Role::Provisioner => write!(f, "provisioner"),
            Role::FastProvisioner => write!(f, "fast_provisioner"),
        }
    }
}

/// Roles this stack instance was built to support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Provisioner role enabled
    #[serde(default = "default_provisioner")]
    pub provisioner: bool,

    /// Fast-provisioning role enabled
    #[serde(default)]
    pub fast_prov: bool,
}

fn default_provisioner() -> bool {
    true
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            provisioner: true,
            fast_prov: false,
        }
    }
}

impl Capabilities {
    /// Whether a send may use `role`
    pub fn permits(&self, role: Role) -> bool {
        match role {
            Role::Node => true,
            Role::Provisioner => self.provisioner,
            Role::FastProvisioner => self.fast_prov,
        }
    }
}
