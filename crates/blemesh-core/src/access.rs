//! Access PDU framing: opcode followed by parameters.

use bytes::{Bytes, BytesMut};

use crate::error::{MeshError, Result};
use crate::opcode::Opcode;

/// Largest parameter block the lower transport accepts
pub const MAX_ACCESS_PAYLOAD: usize = 380;

/// Build an access PDU
pub fn encode_access(opcode: Opcode, params: &[u8]) -> Result<Bytes> {
    if params.len() > MAX_ACCESS_PAYLOAD {
        return Err(MeshError::InvalidArgument(format!(
            "access payload of {} bytes exceeds {}",
            params.len(),
            MAX_ACCESS_PAYLOAD
        )));
    }

    let mut buf = BytesMut::with_capacity(opcode.wire_len() + params.len());
    opcode.encode(&mut buf);
    buf.extend_from_slice(params);
    Ok(buf.freeze())
}

/// Split an access PDU into opcode and parameters
pub fn decode_access(pdu: &[u8]) -> Result<(Opcode, Bytes)> {
    let mut cursor = pdu;
    let opcode = Opcode::decode(&mut cursor)?;
    if cursor.len() > MAX_ACCESS_PAYLOAD {
        return Err(MeshError::InvalidArgument(format!(
            "access payload of {} bytes exceeds {}",
            cursor.len(),
            MAX_ACCESS_PAYLOAD
        )));
    }
    Ok((opcode, Bytes::copy_from_slice(cursor)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onoff_status_pdu() {
        let pdu = encode_access(Opcode::two(0x82, 0x04), &[0x01]).unwrap();
        assert_eq!(&pdu[..], &[0x82, 0x04, 0x01]);

        let (op, params) = decode_access(&pdu).unwrap();
        assert_eq!(op, Opcode::two(0x82, 0x04));
        assert_eq!(&params[..], &[0x01]);
    }

    #[test]
    fn test_vendor_pdu_without_params() {
        let pdu = encode_access(Opcode::vendor(0x02, 0x02E5), &[]).unwrap();
        assert_eq!(pdu.len(), 3);
        let (op, params) = decode_access(&pdu).unwrap();
        assert!(op.is_vendor());
        assert!(params.is_empty());
    }

    #[test]
    fn test_oversized_payload() {
        let params = vec![0u8; MAX_ACCESS_PAYLOAD + 1];
        assert!(encode_access(Opcode::one(0x00), &params).is_err());
    }
}
