//! In-process transport pair.
//!
//! [`MemoryTransport`] is handed to a [`Connection`](crate::Connection);
//! the matching [`DeviceHandle`] plays the device: it sees every written
//! frame and injects notifications, link failures and closure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use meshcore_companion_protocol::{Notification, ProtocolError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{FrameSink, Transport};

#[derive(Debug, Default)]
struct Shared {
    sink: Mutex<Option<FrameSink>>,
    write_error: Mutex<Option<TransportError>>,
    disconnected: AtomicBool,
}

/// Host side of an in-process link.
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    written: mpsc::UnboundedSender<Bytes>,
}

/// Device side of an in-process link.
#[derive(Debug)]
pub struct DeviceHandle {
    shared: Arc<Shared>,
    written: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryTransport {
    /// Create a connected transport and device pair.
    pub fn pair() -> (MemoryTransport, DeviceHandle) {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MemoryTransport {
                shared: shared.clone(),
                written: tx,
            },
            DeviceHandle {
                shared,
                written: rx,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn start(&mut self, sink: FrameSink) -> Result<(), TransportError> {
        if self.shared.disconnected.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        *self.shared.sink.lock() = Some(sink);
        Ok(())
    }

    async fn write(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
        if self.shared.disconnected.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if let Some(err) = self.shared.write_error.lock().clone() {
            return Err(err);
        }
        self.written
            .send(Bytes::copy_from_slice(frame))
            .map_err(|_| TransportError::Closed)?;
        Ok(frame.len())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if !self.shared.disconnected.swap(true, Ordering::AcqRel) {
            self.shared.sink.lock().take();
            debug!("memory transport disconnected");
        }
        Ok(())
    }
}

impl DeviceHandle {
    /// Wait for the next frame the host wrote.
    ///
    /// Returns `None` once the transport is dropped and every frame was read.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        self.written.recv().await
    }

    /// The next written frame, if one is already waiting.
    pub fn try_next_frame(&mut self) -> Option<Bytes> {
        self.written.try_recv().ok()
    }

    /// Inject a raw frame, code byte first. Returns `false` if the host is
    /// not listening.
    pub fn inject(&self, frame: &[u8]) -> bool {
        match self.shared.sink.lock().as_ref() {
            Some(sink) => {
                sink.deliver(Bytes::copy_from_slice(frame));
                true
            }
            None => false,
        }
    }

    /// Encode and inject a notification.
    pub fn send(&self, notification: &Notification) -> Result<bool, ProtocolError> {
        let frame = notification.encode()?;
        Ok(self.inject(&frame))
    }

    /// Fail the link as a read error would.
    pub fn fail(&self, err: TransportError) {
        if let Some(sink) = self.shared.sink.lock().take() {
            sink.fail(err);
        }
    }

    /// Close the link from the device side.
    pub fn close(&self) {
        self.fail(TransportError::Closed);
    }

    /// Make every following write fail with `err`, or succeed again with
    /// `None`.
    pub fn fail_writes(&self, err: Option<TransportError>) {
        *self.shared.write_error.lock() = err;
    }

    /// Whether the host disconnected.
    pub fn is_disconnected(&self) -> bool {
        self.shared.disconnected.load(Ordering::Acquire)
    }

    /// Whether the host started the transport and still listens.
    pub fn is_listening(&self) -> bool {
        self.shared
            .sink
            .lock()
            .as_ref()
            .is_some_and(FrameSink::is_attached)
    }
}
