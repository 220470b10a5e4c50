//! Field-level helpers shared by the command encoder and notification decoder.
//!
//! Strings inside frames come in two shapes: fixed-width C strings (a
//! NUL-terminated UTF-8 string padded to `N` bytes) and trailing strings that
//! run to the end of the frame. Coordinates and radio parameters travel as
//! scaled integers.

use bytes::BufMut;

use crate::error::ProtocolError;

/// Read a fixed-width C string.
///
/// The whole slice is the field. Fails if it contains no NUL.
pub fn read_cstring(field: &[u8]) -> Result<String, ProtocolError> {
    let end = field
        .iter()
        .position(|&b| b == 0)
        .ok_or(ProtocolError::UnterminatedCString { len: field.len() })?;
    std::str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidUtf8)
}

/// Encode `s` into a zero-padded field of `width` bytes.
///
/// Fails if `s` is longer than `width - 1` bytes.
pub fn write_cstring(s: &str, width: usize) -> Result<Vec<u8>, ProtocolError> {
    let mut field = Vec::with_capacity(width);
    put_cstring(&mut field, s, width)?;
    Ok(field)
}

/// Append `s` as a zero-padded field of `width` bytes.
pub fn put_cstring(buf: &mut Vec<u8>, s: &str, width: usize) -> Result<(), ProtocolError> {
    let bytes = s.as_bytes();
    let max = width.saturating_sub(1);
    if bytes.len() > max {
        return Err(ProtocolError::StringTooLong {
            len: bytes.len(),
            max,
        });
    }
    buf.put_slice(bytes);
    buf.put_bytes(0, width - bytes.len());
    Ok(())
}

/// Decode a trailing string. Stops at the first NUL if the firmware padded it.
///
/// Decoding is lossy: invalid UTF-8 becomes U+FFFD instead of failing the
/// frame, so one bad byte from a peer does not cost the whole message.
pub fn read_trailing_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Degrees to signed micro-degrees, rounded to the nearest unit.
pub fn degrees_to_micro(degrees: f64) -> i32 {
    (degrees * 1_000_000.0).round() as i32
}

/// Signed micro-degrees to degrees.
pub fn micro_to_degrees(micro: i32) -> f64 {
    micro as f64 / 1_000_000.0
}

/// Scale a value by 1000 for the wire (MHz to kHz, kHz to Hz).
pub fn to_milli_units(value: f64) -> u32 {
    (value * 1000.0).round() as u32
}

/// Undo [`to_milli_units`].
pub fn from_milli_units(raw: u32) -> f64 {
    raw as f64 / 1000.0
}

/// Bounds-checked little-endian cursor over a notification payload.
///
/// Every short read reports the frame code, the length the layout needed
/// and the length actually present.
#[derive(Debug)]
pub(crate) struct Reader<'a> {
    code: u8,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(code: u8, data: &'a [u8]) -> Self {
        Reader { code, data, pos: 0 }
    }

    pub(crate) fn malformed(&self, expected: usize) -> ProtocolError {
        ProtocolError::Malformed {
            code: self.code,
            expected,
            actual: self.data.len(),
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(self.malformed(end));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.u8()? as i8)
    }

    pub(crate) fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn cstring(&mut self, width: usize) -> Result<String, ProtocolError> {
        read_cstring(self.take(width)?)
    }

    /// Everything not yet consumed.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    /// Strict end-of-frame check for layouts without a trailing field.
    pub(crate) fn finish(self) -> Result<(), ProtocolError> {
        if self.pos != self.data.len() {
            return Err(self.malformed(self.pos));
        }
        Ok(())
    }
}
