//! Transport over a framed byte stream (serial device, TCP bridge).

use async_trait::async_trait;
use meshcore_companion_protocol::FrameCodec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::transport::{FrameSink, Transport};

const READ_BUFFER_SIZE: usize = 1024;

/// A [`Transport`] over any async byte stream using the serial framing.
///
/// `start` splits the stream and spawns one task that reads, unframes and
/// delivers inbound frames. End of stream or a read error shuts the
/// connection down.
pub struct StreamTransport<S> {
    stream: Option<S>,
    writer: Option<WriteHalf<S>>,
    reader: Option<JoinHandle<()>>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap an already opened stream.
    pub fn new(stream: S) -> Self {
        StreamTransport {
            stream: Some(stream),
            writer: None,
            reader: None,
        }
    }
}

impl StreamTransport<TcpStream> {
    /// Connect to a TCP serial bridge.
    pub async fn connect_tcp<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn start(&mut self, sink: FrameSink) -> Result<(), TransportError> {
        let stream = self.stream.take().ok_or(TransportError::Closed)?;
        let (reader, writer) = tokio::io::split(stream);
        self.writer = Some(writer);
        self.reader = Some(tokio::spawn(read_loop(reader, sink)));
        debug!("stream transport started");
        Ok(())
    }

    async fn write(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        let data = FrameCodec::encode(frame)?;
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(frame.len())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.stream = None;
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "stream shutdown failed");
            }
            debug!("stream transport disconnected");
        }
        Ok(())
    }
}

impl<S> Drop for StreamTransport<S> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_loop<S: AsyncRead>(mut reader: ReadHalf<S>, sink: FrameSink) {
    let mut codec = FrameCodec::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("stream closed by peer");
                sink.close();
                return;
            }
            Ok(n) => {
                trace!(bytes = n, "read");
                codec.feed(&buf[..n]);
                while let Some(frame) = codec.decode() {
                    sink.deliver(frame);
                }
            }
            Err(e) => {
                warn!(error = %e, "stream read failed");
                sink.fail(e.into());
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::center::{DeliveryPolicy, NotificationCenter, ShutdownReason};
    use meshcore_companion_protocol::NotificationCode;

    #[tokio::test]
    async fn test_frames_cross_the_stream() {
        let (host, mut device) = tokio::io::duplex(256);
        let center = NotificationCenter::new();
        let mut sub = center
            .subscribe(&[NotificationCode::CurrTime], DeliveryPolicy::Buffered(4))
            .unwrap();

        let mut transport = StreamTransport::new(host);
        transport.start(FrameSink::new(&center)).await.unwrap();
        assert_eq!(transport.write(&[5]).await.unwrap(), 1);

        let mut written = [0u8; 4];
        device.read_exact(&mut written).await.unwrap();
        assert_eq!(written, [b'<', 1, 0, 5]);

        // Split across two writes to exercise reassembly
        let reply = FrameCodec::encode_inbound(&[9, 0x64, 0, 0, 0]).unwrap();
        device.write_all(&reply[..2]).await.unwrap();
        device.write_all(&reply[2..]).await.unwrap();
        let frame = sub.recv().await.unwrap().unwrap();
        assert_eq!(frame.code, 9);
        assert_eq!(&frame.payload[..], &[0x64, 0, 0, 0]);

        drop(device);
        assert!(matches!(
            sub.recv().await,
            Some(Err(ShutdownReason::LinkFailed(TransportError::Closed)))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (host, _device) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(host);
        let center = NotificationCenter::new();
        transport.start(FrameSink::new(&center)).await.unwrap();
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
        assert!(matches!(
            transport.write(&[5]).await,
            Err(TransportError::Closed)
        ));
    }
}
