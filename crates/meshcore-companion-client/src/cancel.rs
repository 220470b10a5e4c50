//! Cancellation handles accepted by every operation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Why a [`CancelToken`] fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`CancelToken::cancel`] was called.
    Cancelled,
    /// The deadline passed.
    TimedOut,
}

/// A clonable cancellation signal with an optional deadline.
///
/// All clones share one flag. Cancelling is idempotent and has no effect on
/// operations that already completed.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A token that only fires when cancelled.
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        CancelToken {
            flag: Arc::new(flag),
            deadline: None,
        }
    }

    /// A token that also fires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().limited(timeout)
    }

    /// A clone sharing this token's flag whose deadline is at most `timeout`
    /// from now. A timeout too large to represent adds no deadline.
    pub fn limited(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// A clone sharing this token's flag with the earlier of the two deadlines.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        CancelToken {
            flag: self.flag.clone(),
            deadline: Some(deadline),
        }
    }

    /// Fire the token. Calling it again does nothing.
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the token has fired, either way.
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Why the token fired, if it has.
    pub fn reason(&self) -> Option<CancelReason> {
        if *self.flag.borrow() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::TimedOut),
            _ => None,
        }
    }

    /// Wait until the token fires.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.flag.subscribe();
        let flagged = async move {
            // The sender lives as long as `self`, so this only returns once set
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        };
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = flagged => CancelReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => CancelReason::TimedOut,
            },
            None => {
                flagged.await;
                CancelReason::Cancelled
            }
        }
    }
}
