//! Access-layer opcodes
//!
//! Opcodes are 1, 2 or 3 octets on the wire. The width is carried by the top
//! bits of the first octet:
//!
//! - `0xxxxxxx` - 1 octet (`0x7F` is reserved)
//! - `10xxxxxx` - 2 octets, big-endian
//! - `11xxxxxx` - 3 octets, the first followed by a little-endian company id
//!
//! In memory an [`Opcode`] packs the same information into a `u32`: 1-octet
//! values stay below `0x100`, 2-octet values below `0x10000`, and vendor
//! opcodes are `0xC00000 | (b0 << 16) | company_id`.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MeshError, Result};

/// Reserved single-octet opcode
pub const OPCODE_RFU: u8 = 0x7F;

/// Access-layer opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Opcode(u32);

impl Opcode {
    /// Single-octet opcode
    pub const fn one(b0: u8) -> Self {
        Opcode(b0 as u32)
    }

    /// Two-octet opcode, `b0` first on the wire
    pub const fn two(b0: u8, b1: u8) -> Self {
        Opcode(((b0 as u32) << 8) | b1 as u32)
    }

    /// Vendor opcode qualified by a company id
    pub const fn vendor(b0: u8, company_id: u16) -> Self {
        Opcode((((b0 as u32) << 16) | 0x00C0_0000) | company_id as u32)
    }

    /// Wrap an already packed value
    pub const fn from_raw(raw: u32) -> Self {
        Opcode(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Number of octets this opcode occupies on the wire
    pub const fn wire_len(self) -> usize {
        if self.0 < 0x100 {
            1
        } else if self.0 < 0x10000 {
            2
        } else {
            3
        }
    }

    pub const fn is_vendor(self) -> bool {
        self.wire_len() == 3
    }

    /// Company id of a vendor opcode
    pub const fn company_id(self) -> Option<u16> {
        if self.is_vendor() {
            Some((self.0 & 0xFFFF) as u16)
        } else {
            None
        }
    }

    /// Write the opcode in its wire form
    pub fn encode<B: BufMut>(self, buf: &mut B) {
        match self.wire_len() {
            1 => buf.put_u8(self.0 as u8),
            2 => buf.put_u16(self.0 as u16),
            _ => {
                buf.put_u8(((self.0 >> 16) & 0xFF) as u8);
                buf.put_u16_le((self.0 & 0xFFFF) as u16);
            }
        }
    }

    /// Read an opcode from the front of `buf`
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(MeshError::InvalidArgument("empty access PDU".to_string()));
        }

        let b0 = buf.get_u8();
        if b0 == OPCODE_RFU {
            return Err(MeshError::InvalidArgument(format!(
                "reserved opcode 0x{:02X}",
                b0
            )));
        }

        match b0 >> 6 {
            0b00 | 0b01 => Ok(Opcode::one(b0)),
            0b10 => {
                if buf.remaining() < 1 {
                    return Err(MeshError::InvalidArgument(
                        "truncated 2-octet opcode".to_string(),
                    ));
                }
                Ok(Opcode::two(b0, buf.get_u8()))
            }
            _ => {
                if buf.remaining() < 2 {
                    return Err(MeshError::InvalidArgument(
                        "truncated vendor opcode".to_string(),
                    ));
                }
                let cid = buf.get_u16_le();
                Ok(Opcode(((b0 as u32) << 16) | cid as u32))
            }
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.wire_len() {
            1 => write!(f, "0x{:02X}", self.0),
            2 => write!(f, "0x{:04X}", self.0),
            _ => write!(f, "0x{:06X}", self.0),
        }
    }
}
