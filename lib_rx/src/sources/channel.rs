//! # Feed Channel
//!
//! Push producers (callbacks handing values over whenever they have one) and pull
//! producers (pumped at a pacing interval) both end up here: a bounded queue of
//! [`Feed`] items drained by one consumer task that publishes into the stream.
//! Whatever the producer's nature, the stream sees the same contract: values in
//! order, then at most one end marker.

use tokio::sync::mpsc;

use crate::core::error::RxError;
use crate::core::stream::Emitter;

pub(crate) enum Feed<V> {
    Value(V),
    End(String),
}

/// Spawns the consumer task for `out` and returns the producing half.
///
/// The task stops at the first end marker, when every sender is gone, or when
/// `out` is disposed or dropped. It holds `out` weakly.
pub(crate) fn open<V: Clone + 'static>(label: &str, out: Emitter<V>, capacity: usize) -> mpsc::Sender<Feed<V>> {
    let (tx, mut rx) = mpsc::channel::<Feed<V>>(capacity.max(1));
    let lifetime = out.lifetime();

    let label = label.to_string();
    tokio::task::spawn_local(async move {
        loop {
            let item = tokio::select! {
                _ = lifetime.cancelled() => break,
                item = rx.recv() => item,
            };
            match item {
                Some(Feed::Value(v)) => {
                    if !out.set(v) {
                        // Disposed or dropped; nobody left to publish to.
                        break;
                    }
                }
                Some(Feed::End(reason)) => {
                    out.dispose(&reason);
                    break;
                }
                None => {
                    out.dispose("producer dropped");
                    break;
                }
            }
        }
        log::trace!("Feed consumer for '{}' stopped", label);
    });

    tx
}

/// Producing half handed to callback-style sources.
pub struct Pusher<V> {
    label: String,
    tx: mpsc::Sender<Feed<V>>,
}

impl<V> Clone for Pusher<V> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<V> Pusher<V> {
    pub(crate) fn new(label: String, tx: mpsc::Sender<Feed<V>>) -> Self {
        Self { label, tx }
    }

    /// Queues a value, waiting for room when the queue is full.
    pub async fn push(&self, value: V) -> Result<(), RxError> {
        self.tx
            .send(Feed::Value(value))
            .await
            .map_err(|_| RxError::StreamDisposed(self.label.clone()))
    }

    /// Queues a value without waiting.
    pub fn try_push(&self, value: V) -> Result<(), RxError> {
        self.tx.try_send(Feed::Value(value)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                log::warn!("Queue of '{}' is full, value dropped", self.label);
                RxError::QueueFull(self.label.clone())
            }
            mpsc::error::TrySendError::Closed(_) => RxError::StreamDisposed(self.label.clone()),
        })
    }

    /// Ends the stream once every queued value has been published.
    pub async fn end(&self, reason: &str) {
        let _ = self.tx.send(Feed::End(reason.to_string())).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
