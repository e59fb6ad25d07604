//! Request-to-status opcode pairs
//!
//! Each client model type owns one [`OpcodePairTable`]. A request is only tracked
//! when its opcode appears in the table; the paired status opcode is the one an
//! inbound message must carry to complete the transaction. Tables are fixed at
//! model registration and read without locking.

use blemesh_core::Opcode;
use std::borrow::Cow;

/// One request opcode and the status opcode that answers it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodePair {
    /// Request sent by the client
    pub request: Opcode,
    /// Status expected back
    pub status: Opcode,
}

impl OpcodePair {
    pub const fn new(request: Opcode, status: Opcode) -> Self {
        Self { request, status }
    }
}

const fn pair(request: Opcode, status: Opcode) -> OpcodePair {
    OpcodePair::new(request, status)
}

const fn op2(b0: u8, b1: u8) -> Opcode {
    Opcode::two(b0, b1)
}

/// Immutable request/status mapping for one model type
#[derive(Debug, Clone)]
pub struct OpcodePairTable {
    pairs: Cow<'static, [OpcodePair]>,
}

impl OpcodePairTable {
    /// Table over owned pairs, for vendor models
    pub fn new(pairs: Vec<OpcodePair>) -> Self {
        Self {
            pairs: Cow::Owned(pairs),
        }
    }

    /// Table over a static list
    pub const fn from_static(pairs: &'static [OpcodePair]) -> Self {
        Self {
            pairs: Cow::Borrowed(pairs),
        }
    }

    /// Status opcode expected for `request`, first match wins
    pub fn lookup(&self, request: Opcode) -> Option<Opcode> {
        self.pairs
            .iter()
            .find(|p| p.request == request)
            .map(|p| p.status)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpcodePair> {
        self.pairs.iter()
    }

    /// Generic client models (OnOff, Level, Default Transition Time, Power OnOff,
    /// Power Level, Battery)
    pub const fn generic() -> Self {
        Self::from_static(GENERIC_PAIRS)
    }

    /// Lighting client models (Lightness, CTL, HSL, xyL, LC)
    pub const fn lighting() -> Self {
        Self::from_static(LIGHTING_PAIRS)
    }

    /// Configuration client
    pub const fn config() -> Self {
        Self::from_static(CONFIG_PAIRS)
    }

    /// Health client
    pub const fn health() -> Self {
        Self::from_static(HEALTH_PAIRS)
    }

    /// Sensor client
    pub const fn sensor() -> Self {
        Self::from_static(SENSOR_PAIRS)
    }
}

pub const GENERIC_PAIRS: &[OpcodePair] = &[
    // OnOff
    pair(op2(0x82, 0x01), op2(0x82, 0x04)),
    pair(op2(0x82, 0x02), op2(0x82, 0x04)),
    // Level
    pair(op2(0x82, 0x05), op2(0x82, 0x08)),
    pair(op2(0x82, 0x06), op2(0x82, 0x08)),
    pair(op2(0x82, 0x09), op2(0x82, 0x08)),
    pair(op2(0x82, 0x0B), op2(0x82, 0x08)),
    // Default Transition Time
    pair(op2(0x82, 0x0D), op2(0x82, 0x10)),
    pair(op2(0x82, 0x0E), op2(0x82, 0x10)),
    // Power OnOff
    pair(op2(0x82, 0x11), op2(0x82, 0x12)),
    pair(op2(0x82, 0x13), op2(0x82, 0x12)),
    // Power Level
    pair(op2(0x82, 0x15), op2(0x82, 0x18)),
    pair(op2(0x82, 0x16), op2(0x82, 0x18)),
    // Battery
    pair(op2(0x82, 0x23), op2(0x82, 0x24)),
];

pub const LIGHTING_PAIRS: &[OpcodePair] = &[
    // Lightness
    pair(op2(0x82, 0x4B), op2(0x82, 0x4E)),
    pair(op2(0x82, 0x4C), op2(0x82, 0x4E)),
    pair(op2(0x82, 0x4F), op2(0x82, 0x52)),
    pair(op2(0x82, 0x50), op2(0x82, 0x52)),
    pair(op2(0x82, 0x53), op2(0x82, 0x54)),
    pair(op2(0x82, 0x55), op2(0x82, 0x56)),
    pair(op2(0x82, 0x59), op2(0x82, 0x56)),
    pair(op2(0x82, 0x57), op2(0x82, 0x58)),
    pair(op2(0x82, 0x5B), op2(0x82, 0x58)),
    // CTL
    pair(op2(0x82, 0x5D), op2(0x82, 0x60)),
    pair(op2(0x82, 0x5E), op2(0x82, 0x60)),
    pair(op2(0x82, 0x61), op2(0x82, 0x66)),
    pair(op2(0x82, 0x64), op2(0x82, 0x66)),
    pair(op2(0x82, 0x62), op2(0x82, 0x63)),
    pair(op2(0x82, 0x6B), op2(0x82, 0x63)),
    pair(op2(0x82, 0x67), op2(0x82, 0x68)),
    pair(op2(0x82, 0x69), op2(0x82, 0x68)),
    // HSL
    pair(op2(0x82, 0x6D), op2(0x82, 0x78)),
    pair(op2(0x82, 0x76), op2(0x82, 0x78)),
    pair(op2(0x82, 0x6E), op2(0x82, 0x71)),
    pair(op2(0x82, 0x6F), op2(0x82, 0x71)),
    pair(op2(0x82, 0x72), op2(0x82, 0x75)),
    pair(op2(0x82, 0x73), op2(0x82, 0x75)),
    pair(op2(0x82, 0x79), op2(0x82, 0x7A)),
    pair(op2(0x82, 0x7B), op2(0x82, 0x7C)),
    pair(op2(0x82, 0x7F), op2(0x82, 0x7C)),
    pair(op2(0x82, 0x7D), op2(0x82, 0x7E)),
    pair(op2(0x82, 0x81), op2(0x82, 0x7E)),
    // xyL
    pair(op2(0x82, 0x83), op2(0x82, 0x86)),
    pair(op2(0x82, 0x84), op2(0x82, 0x86)),
    pair(op2(0x82, 0x87), op2(0x82, 0x88)),
    pair(op2(0x82, 0x89), op2(0x82, 0x8A)),
    pair(op2(0x82, 0x8D), op2(0x82, 0x8A)),
    pair(op2(0x82, 0x8B), op2(0x82, 0x8C)),
    pair(op2(0x82, 0x8F), op2(0x82, 0x8C)),
    // LC
    pair(op2(0x82, 0x91), op2(0x82, 0x94)),
    pair(op2(0x82, 0x92), op2(0x82, 0x94)),
    pair(op2(0x82, 0x95), op2(0x82, 0x98)),
    pair(op2(0x82, 0x96), op2(0x82, 0x98)),
    pair(op2(0x82, 0x99), op2(0x82, 0x9C)),
    pair(op2(0x82, 0x9A), op2(0x82, 0x9C)),
    pair(op2(0x82, 0x9D), Opcode::one(0x64)),
    pair(Opcode::one(0x62), Opcode::one(0x64)),
];

pub const CONFIG_PAIRS: &[OpcodePair] = &[
    // AppKey
    pair(Opcode::one(0x00), op2(0x80, 0x03)),
    pair(Opcode::one(0x01), op2(0x80, 0x03)),
    pair(op2(0x80, 0x00), op2(0x80, 0x03)),
    pair(op2(0x80, 0x01), op2(0x80, 0x02)),
    // Composition data
    pair(op2(0x80, 0x08), Opcode::one(0x02)),
    // Beacon, default TTL, relay
    pair(op2(0x80, 0x09), op2(0x80, 0x0B)),
    pair(op2(0x80, 0x0A), op2(0x80, 0x0B)),
    pair(op2(0x80, 0x0C), op2(0x80, 0x0E)),
    pair(op2(0x80, 0x0D), op2(0x80, 0x0E)),
    pair(op2(0x80, 0x26), op2(0x80, 0x28)),
    pair(op2(0x80, 0x27), op2(0x80, 0x28)),
    // Subscription, NetKey, model app bind
    pair(op2(0x80, 0x1B), op2(0x80, 0x1F)),
    pair(op2(0x80, 0x40), op2(0x80, 0x44)),
    pair(op2(0x80, 0x3D), op2(0x80, 0x3E)),
    // Node reset
    pair(op2(0x80, 0x49), op2(0x80, 0x4A)),
];

pub const HEALTH_PAIRS: &[OpcodePair] = &[
    pair(op2(0x80, 0x31), Opcode::one(0x05)),
    pair(op2(0x80, 0x34), op2(0x80, 0x37)),
    pair(op2(0x80, 0x04), op2(0x80, 0x07)),
];

pub const SENSOR_PAIRS: &[OpcodePair] = &[
    pair(op2(0x82, 0x30), Opcode::one(0x51)),
    pair(op2(0x82, 0x31), Opcode::one(0x52)),
];
