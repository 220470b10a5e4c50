//! Push notification streams.

use futures_util::stream::{self, Stream};
use meshcore_companion_protocol::Notification;
use tracing::{trace, warn};

use crate::cancel::CancelToken;
use crate::center::{ShutdownReason, Subscription};
use crate::error::Result;

/// A lazy, non-restartable sequence of push notifications.
///
/// Holds at most one pending notification: if the reader falls behind, the
/// newest notification replaces the pending one. Malformed frames are logged
/// and skipped.
///
/// The sequence ends when its [`CancelToken`] fires, when it is closed, or
/// when the connection is disconnected. A failed link yields the error once
/// before the end.
#[derive(Debug)]
pub struct PushStream {
    sub: Subscription,
    cancel: CancelToken,
    done: bool,
}

impl PushStream {
    pub(crate) fn new(sub: Subscription, cancel: CancelToken) -> Self {
        PushStream {
            sub,
            cancel,
            done: false,
        }
    }

    /// Wait for the next notification; `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Result<Notification>> {
        while !self.done {
            if self.cancel.is_cancelled() {
                self.cancelled();
                return None;
            }
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.cancelled();
                    return None;
                }
                next = self.sub.recv() => next,
            };
            match next {
                Some(Ok(frame)) => match frame.decode() {
                    Ok(notification) => return Some(Ok(notification)),
                    Err(e) => warn!(code = frame.code, error = %e, "skipping malformed push frame"),
                },
                Some(Err(ShutdownReason::Disconnected)) | None => self.done = true,
                Some(Err(reason)) => {
                    self.done = true;
                    return Some(Err(reason.into()));
                }
            }
        }
        None
    }

    fn cancelled(&mut self) {
        trace!(subscription = self.sub.id(), "push stream cancelled");
        self.close();
    }

    /// End the stream now. Anything pending is discarded.
    pub fn close(&mut self) {
        self.done = true;
        self.sub.release();
    }

    /// Whether the stream has ended.
    pub fn is_closed(&self) -> bool {
        self.done
    }

    /// Adapt into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Notification>> + Send {
        stream::unfold(self, |mut push| async move {
            let item = push.next().await?;
            Some((item, push))
        })
    }
}
