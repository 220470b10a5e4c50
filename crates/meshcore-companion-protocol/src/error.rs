//! Protocol error types.

use thiserror::Error;

use crate::constants::*;

/// Errors produced while encoding or decoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The payload does not match the fixed layout for its code.
    #[error("malformed frame 0x{code:02X}: expected {expected} bytes, got {actual}")]
    Malformed {
        /// Notification or command code of the frame.
        code: u8,
        /// Length the layout requires.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// A fixed-width string field has no NUL terminator.
    #[error("unterminated C string in {len}-byte field")]
    UnterminatedCString {
        /// Width of the field.
        len: usize,
    },

    /// A string does not fit its fixed-width field (one byte is kept for NUL).
    #[error("string of {len} bytes does not fit a field of {max} bytes plus NUL")]
    StringTooLong {
        /// Encoded length of the string.
        len: usize,
        /// Maximum string length for the field.
        max: usize,
    },

    /// A variable field exceeds the limit the firmware accepts.
    #[error("{field} is {len} bytes, maximum is {max}")]
    FieldTooLong {
        /// Name of the field.
        field: &'static str,
        /// Actual length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// The code byte names no known notification.
    #[error("unknown notification code: 0x{0:02X}")]
    UnknownNotification(u8),

    /// The code byte names no known command.
    #[error("unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),

    /// A frame with no code byte.
    #[error("empty frame")]
    EmptyFrame,

    /// A serial frame exceeds the framing limit.
    #[error("frame too long: maximum {max} bytes, got {actual}")]
    FrameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },
}

/// Error codes carried by an `Err` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
    /// Unspecified failure, or an `Err` with no payload.
    Unknown,
    /// Command not supported by this firmware.
    UnsupportedCommand,
    /// Item not found.
    NotFound,
    /// Contact or channel table is full.
    TableFull,
    /// Wrong state for this command.
    BadState,
    /// Filesystem error on the device.
    FileIo,
    /// Argument rejected.
    IllegalArgument,
    /// A code this library does not know.
    Other(u8),
}

impl DeviceErrorCode {
    /// The wire value.
    pub fn raw(&self) -> u8 {
        u8::from(*self)
    }

    /// Human readable description, as shown in error messages.
    pub fn description(&self) -> &'static str {
        match self {
            DeviceErrorCode::Unknown | DeviceErrorCode::Other(_) => "unknown error",
            DeviceErrorCode::UnsupportedCommand => "unsupported command",
            DeviceErrorCode::NotFound => "not found",
            DeviceErrorCode::TableFull => "table full",
            DeviceErrorCode::BadState => "bad state",
            DeviceErrorCode::FileIo => "file io error",
            DeviceErrorCode::IllegalArgument => "illegal argument",
        }
    }
}

impl From<u8> for DeviceErrorCode {
    fn from(code: u8) -> Self {
        match code {
            ERR_CODE_UNKNOWN => DeviceErrorCode::Unknown,
            ERR_CODE_UNSUPPORTED_CMD => DeviceErrorCode::UnsupportedCommand,
            ERR_CODE_NOT_FOUND => DeviceErrorCode::NotFound,
            ERR_CODE_TABLE_FULL => DeviceErrorCode::TableFull,
            ERR_CODE_BAD_STATE => DeviceErrorCode::BadState,
            ERR_CODE_FILE_IO_ERROR => DeviceErrorCode::FileIo,
            ERR_CODE_ILLEGAL_ARG => DeviceErrorCode::IllegalArgument,
            other => DeviceErrorCode::Other(other),
        }
    }
}

impl From<DeviceErrorCode> for u8 {
    fn from(code: DeviceErrorCode) -> Self {
        match code {
            DeviceErrorCode::Unknown => ERR_CODE_UNKNOWN,
            DeviceErrorCode::UnsupportedCommand => ERR_CODE_UNSUPPORTED_CMD,
            DeviceErrorCode::NotFound => ERR_CODE_NOT_FOUND,
            DeviceErrorCode::TableFull => ERR_CODE_TABLE_FULL,
            DeviceErrorCode::BadState => ERR_CODE_BAD_STATE,
            DeviceErrorCode::FileIo => ERR_CODE_FILE_IO_ERROR,
            DeviceErrorCode::IllegalArgument => ERR_CODE_ILLEGAL_ARG,
            DeviceErrorCode::Other(code) => code,
        }
    }
}

/// The device answered a command with `Err`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[error("response error: {} ({})", .code.raw(), .code.description())]
pub struct DeviceError {
    /// What went wrong.
    pub code: DeviceErrorCode,
}

impl DeviceError {
    /// Wrap an error code.
    pub fn new(code: DeviceErrorCode) -> Self {
        DeviceError { code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_display() {
        let err = DeviceError::new(DeviceErrorCode::from(5));
        assert_eq!(err.code, DeviceErrorCode::FileIo);
        assert_eq!(err.to_string(), "response error: 5 (file io error)");

        let err = DeviceError::new(DeviceErrorCode::Unknown);
        assert_eq!(err.to_string(), "response error: 0 (unknown error)");
    }

    #[test]
    fn test_device_error_code_preserves_unknown_values() {
        let code = DeviceErrorCode::from(42);
        assert_eq!(code, DeviceErrorCode::Other(42));
        assert_eq!(u8::from(code), 42);
        for raw in 0u8..=6 {
            assert_eq!(u8::from(DeviceErrorCode::from(raw)), raw);
        }
    }
}
