//! Connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::center::DeliveryPolicy;

/// Settings for a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// App name sent with `AppStart`.
    pub app_name: String,
    /// Protocol version sent with `AppStart` and `DeviceQuery`.
    pub app_version: u8,
    /// Default per-command timeout in milliseconds. `None` waits forever
    /// unless the caller's token fires.
    pub command_timeout_ms: Option<u64>,
    /// Frames a command subscription buffers before dropping.
    pub response_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            app_name: "meshcore-companion".to_string(),
            app_version: 3,
            command_timeout_ms: Some(10_000),
            response_buffer: 64,
        }
    }
}

impl ConnectionConfig {
    /// The default command timeout.
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn response_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy::Buffered(self.response_buffer.max(1))
    }
}
