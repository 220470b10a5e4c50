//! Error types for the client.

use std::io;
use std::sync::Arc;

use meshcore_companion_protocol::{DeviceError, ProtocolError};
use thiserror::Error;

use crate::cancel::CancelReason;
use crate::center::ShutdownReason;

/// Failures of the underlying link.
///
/// Cheap to clone so one link failure can be handed to every waiter.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// I/O error on the byte stream.
    #[error("io error: {0}")]
    Io(Arc<io::Error>),

    /// The link is closed.
    #[error("link closed")]
    Closed,

    /// The link layer refused a frame.
    #[error("framing error: {0}")]
    Framing(#[from] ProtocolError),

    /// Any other link failure.
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

/// Errors returned by [`Connection`](crate::Connection) operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The device answered with `Err`.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The device sent a notification the operation does not accept here.
    #[error("unexpected notification 0x{code:02X} during {operation}")]
    UnexpectedNotification {
        /// Operation in progress.
        operation: &'static str,
        /// Code that arrived.
        code: u8,
    },

    /// Private key export/import is disabled on the device.
    #[error("private key operations are disabled")]
    PrivateKeyDisabled,

    /// The device opened a signing session that accepts no data.
    #[error("device accepts no data to sign")]
    SignUnavailable,

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation ran past its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The connection has been disconnected.
    #[error("connection closed")]
    Closed,

    /// `connect()` has not been called yet.
    #[error("not connected")]
    NotConnected,

    /// The notification center was shut down.
    #[error("notification center shut down")]
    Shutdown,

    /// The link failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An argument was rejected before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<ShutdownReason> for Error {
    fn from(reason: ShutdownReason) -> Self {
        match reason {
            ShutdownReason::Requested => Error::Shutdown,
            ShutdownReason::Disconnected => Error::Closed,
            ShutdownReason::LinkFailed(err) => Error::Transport(err),
        }
    }
}

impl From<CancelReason> for Error {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => Error::Cancelled,
            CancelReason::TimedOut => Error::Timeout,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
