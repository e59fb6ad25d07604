//! Mesh addresses
//!
//! A mesh address is a 16-bit value whose range determines its kind:
//!
//! | range | kind |
//! |---|---|
//! | `0x0000` | unassigned |
//! | `0x0001..=0x7FFF` | unicast |
//! | `0x8000..=0xBFFF` | virtual |
//! | `0xC000..=0xFFFF` | group (`0xFF00..=0xFFFB` reserved, `0xFFFC..` fixed) |

use serde::{Deserialize, Serialize};
use std::fmt;

/// 16-bit mesh address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(u16);

impl Address {
    /// Unassigned address
    pub const UNASSIGNED: Address = Address(0x0000);
    /// All-proxies fixed group
    pub const ALL_PROXIES: Address = Address(0xFFFC);
    /// All-friends fixed group
    pub const ALL_FRIENDS: Address = Address(0xFFFD);
    /// All-relays fixed group
    pub const ALL_RELAYS: Address = Address(0xFFFE);
    /// All-nodes fixed group
    pub const ALL_NODES: Address = Address(0xFFFF);

    /// Wrap a raw address
    pub const fn new(raw: u16) -> Self {
        Address(raw)
    }

    /// Raw 16-bit value
    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn is_unassigned(self) -> bool {
        self.0 == 0x0000
    }

    pub const fn is_unicast(self) -> bool {
        self.0 != 0x0000 && self.0 < 0x8000
    }

    pub const fn is_virtual(self) -> bool {
        self.0 >= 0x8000 && self.0 < 0xC000
    }

    pub const fn is_group(self) -> bool {
        self.0 >= 0xC000
    }

    /// Reserved part of the group range
    pub const fn is_rfu(self) -> bool {
        self.0 >= 0xFF00 && self.0 <= 0xFFFB
    }

    pub const fn is_fixed_group(self) -> bool {
        self.0 >= 0xFFFC
    }
}

impl From<u16> for Address {
    fn from(raw: u16) -> Self {
        Address(raw)
    }
}

impl From<Address> for u16 {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}
