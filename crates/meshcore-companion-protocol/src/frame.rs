//! Length-prefixed framing for byte-stream links.
//!
//! BLE delivers one frame per notification, but a serial or TCP byte stream
//! needs explicit boundaries. Each frame is prefixed with a direction byte
//! and a 2-byte length (little-endian):
//!
//! ```text
//! +-----+--------+--------+-------------------+
//! | dir | len_lo | len_hi | data[0..len]      |
//! +-----+--------+--------+-------------------+
//! ```
//!
//! `dir` is `'<'` for host → device frames and `'>'` for device → host.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::MAX_FRAME_SIZE;
use crate::error::ProtocolError;

/// Direction byte of host → device frames.
pub const FRAME_START_OUTBOUND: u8 = b'<';
/// Direction byte of device → host frames.
pub const FRAME_START_INBOUND: u8 = b'>';

const HEADER_LEN: usize = 3;

/// Splits a byte stream into frames and wraps outgoing frames in headers.
///
/// Bytes before a direction byte are discarded, as is a header that
/// announces more than `MAX_FRAME_SIZE` bytes.
#[derive(Debug)]
pub struct FrameCodec {
    pending: BytesMut,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// A host-side codec, reading device → host frames.
    pub fn new() -> Self {
        FrameCodec {
            pending: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Append bytes read from the link.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete frame payload, or `None` until more bytes arrive.
    pub fn decode(&mut self) -> Option<Bytes> {
        loop {
            match self.pending.iter().position(|&b| b == FRAME_START_INBOUND) {
                Some(skip) => self.pending.advance(skip),
                None => {
                    self.pending.clear();
                    return None;
                }
            }

            let header = self.pending.get(..HEADER_LEN)?;
            let announced = u16::from_le_bytes([header[1], header[2]]) as usize;
            if announced > MAX_FRAME_SIZE {
                // Not a real header; resync on the next direction byte.
                self.pending.advance(1);
                continue;
            }

            if self.pending.len() < HEADER_LEN + announced {
                return None;
            }
            self.pending.advance(HEADER_LEN);
            return Some(self.pending.split_to(announced).freeze());
        }
    }

    /// Wrap a host → device payload.
    pub fn encode(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        Self::wrap(FRAME_START_OUTBOUND, payload)
    }

    /// Wrap a device → host payload.
    pub fn encode_inbound(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        Self::wrap(FRAME_START_INBOUND, payload)
    }

    fn wrap(start: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLong {
                max: MAX_FRAME_SIZE,
                actual: payload.len(),
            });
        }
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.put_u8(start);
        out.put_u16_le(payload.len() as u16);
        out.put_slice(payload);
        Ok(out)
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
