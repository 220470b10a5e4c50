//! Transport abstraction.
//!
//! A transport moves whole frames between the host and the device. It
//! writes outbound frames when asked and pushes inbound frames into the
//! [`FrameSink`] it was started with.

use std::sync::Weak;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{trace, warn};

use crate::center::{CenterInner, Frame, NotificationCenter, ShutdownReason};
use crate::error::TransportError;

/// Binary duplex link to one device.
#[async_trait]
pub trait Transport: Send {
    /// Begin delivering inbound frames to `sink`.
    async fn start(&mut self, sink: FrameSink) -> Result<(), TransportError>;

    /// Send one complete frame, code byte first. Returns bytes written.
    async fn write(&mut self, frame: &[u8]) -> Result<usize, TransportError>;

    /// Close the link. Calling it again does nothing.
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Inbound side of a connection, handed to [`Transport::start`].
///
/// Holds only a weak reference to the center, so a transport never keeps a
/// dropped connection alive. Once the center is gone every call is a no-op.
#[derive(Debug, Clone)]
pub struct FrameSink {
    center: Weak<CenterInner>,
}

impl FrameSink {
    /// A sink publishing into `center`.
    pub fn new(center: &NotificationCenter) -> Self {
        FrameSink {
            center: center.downgrade(),
        }
    }

    /// Publish one whole inbound frame.
    pub fn deliver(&self, frame: Bytes) {
        let Some(center) = self.center.upgrade() else {
            return;
        };
        trace!(frame = %hex::encode(&frame), "received");
        match Frame::from_bytes(frame) {
            Some(frame) => {
                let code = frame.code;
                if center.publish(frame) == 0 {
                    trace!(code, "no subscriber for frame");
                }
            }
            None => warn!("dropping empty frame"),
        }
    }

    /// The link failed: shut the center down with `err`.
    pub fn fail(&self, err: TransportError) {
        if let Some(center) = self.center.upgrade() {
            if center.shutdown(ShutdownReason::LinkFailed(err.clone())) {
                warn!(error = %err, "link failed");
            }
        }
    }

    /// The peer closed the link.
    pub fn close(&self) {
        self.fail(TransportError::Closed);
    }

    /// Whether the center this sink feeds still exists.
    pub fn is_attached(&self) -> bool {
        self.center.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::center::DeliveryPolicy;
    use meshcore_companion_protocol::NotificationCode;

    #[tokio::test]
    async fn test_sink_splits_code() {
        let center = NotificationCenter::new();
        let sink = FrameSink::new(&center);
        let mut sub = center
            .subscribe(&[NotificationCode::CurrTime], DeliveryPolicy::Buffered(4))
            .unwrap();

        sink.deliver(Bytes::new());
        sink.deliver(Bytes::from_static(&[9, 0x64, 0, 0, 0]));
        let frame = sub.recv().await.unwrap().unwrap();
        assert_eq!(frame.code, 9);
        assert_eq!(&frame.payload[..], &[0x64, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_sink_failure_shuts_down_once() {
        let center = NotificationCenter::new();
        let sink = FrameSink::new(&center);
        let mut sub = center
            .subscribe(&[NotificationCode::Ok], DeliveryPolicy::Buffered(4))
            .unwrap();

        sink.fail(TransportError::Other("unplugged".into()));
        sink.close();
        assert!(matches!(
            sub.recv().await,
            Some(Err(ShutdownReason::LinkFailed(TransportError::Other(_))))
        ));
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_sink_detaches_when_center_dropped() {
        let center = NotificationCenter::new();
        let sink = FrameSink::new(&center);
        assert!(sink.is_attached());
        drop(center);
        assert!(!sink.is_attached());
        sink.deliver(Bytes::from_static(&[0]));
    }
}
