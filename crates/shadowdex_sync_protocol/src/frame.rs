//! Length-prefixed framing.
//!
//! ```text
//! | length: u32 big-endian | body: length bytes |
//! ```

use crate::error::{ProtocolError, ProtocolResult};

/// Size of the length header.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest body accepted on a rendezvous control connection (64 KiB).
pub const MAX_CONTROL_FRAME: usize = 64 * 1024;

/// Prefixes `body` with its length.
pub fn encode_frame(body: &[u8]) -> ProtocolResult<Vec<u8>> {
    let len = u32::try_from(body.len()).map_err(|_| ProtocolError::PayloadTooLarge {
        size: body.len(),
        max: u32::MAX as usize,
    })?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Reads the body length from a header, enforcing `max`.
pub fn decode_frame_len(header: [u8; FRAME_HEADER_LEN], max: usize) -> ProtocolResult<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len > max {
        return Err(ProtocolError::PayloadTooLarge { size: len, max });
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_big_endian() {
        let frame = encode_frame(&[7u8; 258]).unwrap();
        assert_eq!(&frame[..4], &[0, 0, 1, 2]);
        assert_eq!(frame.len(), 262);
    }

    #[test]
    fn oversized_header_rejected() {
        let header = ((MAX_CONTROL_FRAME + 1) as u32).to_be_bytes();
        assert!(decode_frame_len(header, MAX_CONTROL_FRAME).is_err());
        assert_eq!(decode_frame_len([0, 0, 0, 9], MAX_CONTROL_FRAME).unwrap(), 9);
    }
}
