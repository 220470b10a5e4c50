//! MeshCore Companion Radio Client
//!
//! Async host-side core for talking to a companion radio. It sits between a
//! [`Transport`] (BLE, serial, TCP bridge, or the in-memory pair used in
//! tests) and the caller:
//!
//! - **[`Connection`]**: one method per command; serializes commands and
//!   correlates each with the notifications that end it
//! - **[`NotificationCenter`]**: fans inbound frames out to subscriptions
//!   keyed by notification code
//! - **[`PushStream`]**: unsolicited device notifications, newest wins
//! - **[`CancelToken`]**: cancellation and timeouts for every operation
//!
//! # Example
//!
//! ```rust,ignore
//! use meshcore_companion_client::{CancelToken, Connection, ConnectionConfig, StreamTransport};
//!
//! let transport = StreamTransport::connect_tcp("127.0.0.1:5000").await?;
//! let conn = Connection::new(transport, ConnectionConfig::default());
//! conn.connect().await?;
//!
//! let cancel = CancelToken::new();
//! let info = conn.get_self_info(&cancel).await?;
//! let contacts = conn.get_contacts(None, &cancel).await?;
//! println!("{} knows {} contacts", info.name, contacts.len());
//!
//! conn.disconnect().await?;
//! ```

mod cancel;
mod center;
mod config;
mod connection;
mod error;
mod memory;
mod push;
mod stream;
mod transport;

pub use cancel::{CancelReason, CancelToken};
pub use center::{DeliveryPolicy, Frame, NotificationCenter, ShutdownReason, Subscription};
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionState, LoginResult};
pub use error::{Error, Result, TransportError};
pub use memory::{DeviceHandle, MemoryTransport};
pub use push::PushStream;
pub use stream::StreamTransport;
pub use transport::{FrameSink, Transport};

pub use meshcore_companion_protocol as protocol;
