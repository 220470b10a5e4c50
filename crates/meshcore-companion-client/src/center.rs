//! Notification center.
//!
//! Fans the single inbound frame stream out to subscriptions keyed by
//! notification code. Publishing takes the shared lock only long enough to
//! collect the matching subscriptions; the frames are handed over after the
//! lock is released, into a per-subscription queue that never blocks the
//! publisher.
//!
//! A subscription is released when it is dropped. Once
//! [`Subscription::release`] returns, nothing more is delivered to it and
//! anything still queued is discarded.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use meshcore_companion_protocol::{Notification, NotificationCode, ProtocolError};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{trace, warn};

use crate::error::TransportError;

/// One inbound frame, split into code and payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Notification code.
    pub code: u8,
    /// Bytes after the code.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from its parts.
    pub fn new(code: u8, payload: impl Into<Bytes>) -> Self {
        Frame {
            code,
            payload: payload.into(),
        }
    }

    /// Split a whole frame. Returns `None` for an empty one.
    pub fn from_bytes(mut frame: Bytes) -> Option<Self> {
        if frame.is_empty() {
            return None;
        }
        let code = frame.split_to(1)[0];
        Some(Frame {
            code,
            payload: frame,
        })
    }

    /// Decode into a typed notification.
    pub fn decode(&self) -> Result<Notification, ProtocolError> {
        Notification::decode(self.code, &self.payload)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("code", &format_args!("0x{:02X}", self.code))
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

/// What a subscription does when its reader falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// FIFO of the given capacity; further frames are dropped and logged.
    Buffered(usize),
    /// A single slot; a new frame replaces the pending one.
    Coalesce,
}

/// Why the center shut down.
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    /// [`NotificationCenter::shutdown`] was called directly.
    Requested,
    /// The connection was disconnected.
    Disconnected,
    /// The link failed.
    LinkFailed(TransportError),
}

/// Set of notification codes, one bit per byte value.
#[derive(Debug, Clone, Copy, Default)]
struct CodeSet([u64; 4]);

impl CodeSet {
    fn insert(&mut self, code: u8) {
        self.0[(code >> 6) as usize] |= 1 << (code & 63);
    }

    fn contains(&self, code: u8) -> bool {
        self.0[(code >> 6) as usize] & (1 << (code & 63)) != 0
    }
}

#[derive(Debug, Default)]
struct SlotState {
    queue: VecDeque<Frame>,
    terminal: Option<ShutdownReason>,
    closed: bool,
}

#[derive(Debug)]
struct Slot {
    state: Mutex<SlotState>,
    notify: Notify,
    policy: DeliveryPolicy,
}

impl Slot {
    fn new(policy: DeliveryPolicy) -> Self {
        Slot {
            state: Mutex::new(SlotState::default()),
            notify: Notify::new(),
            policy,
        }
    }

    fn offer(&self, id: u64, frame: Frame) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed || state.terminal.is_some() {
                return false;
            }
            match self.policy {
                DeliveryPolicy::Buffered(capacity) => {
                    if state.queue.len() >= capacity {
                        warn!(
                            subscription = id,
                            code = frame.code,
                            capacity,
                            "subscription buffer full, dropping frame"
                        );
                        return false;
                    }
                    state.queue.push_back(frame);
                }
                DeliveryPolicy::Coalesce => {
                    if state.queue.pop_front().is_some() {
                        trace!(subscription = id, "replacing pending frame");
                    }
                    state.queue.push_back(frame);
                }
            }
        }
        self.notify.notify_one();
        true
    }

    fn terminate(&self, reason: ShutdownReason) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.terminal = Some(reason);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.queue.clear();
            state.terminal = None;
        }
        self.notify.notify_one();
    }

    async fn recv(&self) -> Option<Result<Frame, ShutdownReason>> {
        loop {
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(frame) = state.queue.pop_front() {
                    return Some(Ok(frame));
                }
                if let Some(reason) = state.terminal.take() {
                    state.closed = true;
                    return Some(Err(reason));
                }
            }
            self.notify.notified().await;
        }
    }
}

#[derive(Debug)]
struct Entry {
    codes: CodeSet,
    slot: Arc<Slot>,
}

#[derive(Debug, Default)]
struct CenterState {
    subscribers: HashMap<u64, Entry>,
    shutdown: Option<ShutdownReason>,
}

#[derive(Debug, Default)]
pub(crate) struct CenterInner {
    state: RwLock<CenterState>,
    next_id: AtomicU64,
}

impl CenterInner {
    pub(crate) fn publish(&self, frame: Frame) -> usize {
        let targets: Vec<(u64, Arc<Slot>)> = {
            let state = self.state.read();
            if state.shutdown.is_some() {
                return 0;
            }
            state
                .subscribers
                .iter()
                .filter(|(_, entry)| entry.codes.contains(frame.code))
                .map(|(id, entry)| (*id, entry.slot.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (id, slot) in targets {
            if slot.offer(id, frame.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    pub(crate) fn shutdown(&self, reason: ShutdownReason) -> bool {
        let entries: Vec<Entry> = {
            let mut state = self.state.write();
            if state.shutdown.is_some() {
                return false;
            }
            state.shutdown = Some(reason.clone());
            state.subscribers.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.slot.terminate(reason.clone());
        }
        true
    }

    fn remove(&self, id: u64) {
        self.state.write().subscribers.remove(&id);
    }
}

/// Shared hub between the transport's inbound side and waiting callers.
///
/// Cloning yields another handle to the same center.
#[derive(Debug, Clone, Default)]
pub struct NotificationCenter {
    inner: Arc<CenterInner>,
}

impl NotificationCenter {
    /// Create an empty center.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `codes`.
    ///
    /// Frames published before this returns are not delivered. Fails with
    /// the shutdown reason once the center has shut down.
    pub fn subscribe(
        &self,
        codes: &[NotificationCode],
        policy: DeliveryPolicy,
    ) -> Result<Subscription, ShutdownReason> {
        let mut set = CodeSet::default();
        for code in codes {
            set.insert(code.as_u8());
        }
        let slot = Arc::new(Slot::new(policy));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut state = self.inner.state.write();
        if let Some(reason) = &state.shutdown {
            return Err(reason.clone());
        }
        state.subscribers.insert(
            id,
            Entry {
                codes: set,
                slot: slot.clone(),
            },
        );
        drop(state);

        trace!(subscription = id, ?codes, "subscribed");
        Ok(Subscription {
            id,
            slot,
            center: self.inner.clone(),
        })
    }

    /// Hand `frame` to every subscription that listed its code.
    ///
    /// Returns how many subscriptions accepted it.
    pub fn publish(&self, frame: Frame) -> usize {
        self.inner.publish(frame)
    }

    /// Shut down: every subscription receives `reason` once and ends, and
    /// later subscribes fail. Returns `false` if already shut down.
    pub fn shutdown(&self, reason: ShutdownReason) -> bool {
        self.inner.shutdown(reason)
    }

    /// Whether the center has shut down.
    pub fn is_shut_down(&self) -> bool {
        self.inner.state.read().shutdown.is_some()
    }

    /// Why the center shut down, if it has.
    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        self.inner.state.read().shutdown.clone()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.read().subscribers.len()
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<CenterInner> {
        Arc::downgrade(&self.inner)
    }
}

/// A registration with the center.
///
/// Released on drop; [`release`](Self::release) may also be called early and
/// any number of times.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    slot: Arc<Slot>,
    center: Arc<CenterInner>,
}

impl Subscription {
    /// Identifier, unique within its center.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next frame.
    ///
    /// Yields frames in publish order, then at most one shutdown reason, then
    /// `None` forever. Returns `None` immediately once released.
    pub async fn recv(&mut self) -> Option<Result<Frame, ShutdownReason>> {
        self.slot.recv().await
    }

    /// Stop deliveries and discard anything queued.
    pub fn release(&self) {
        self.slot.close();
        self.center.remove(self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
        trace!(subscription = self.id, "released");
    }
}
