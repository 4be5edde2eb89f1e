//! Bounded mailbox between pollers and the single dispatch loop.
//!
//! Producers suspend while the mailbox is full. Nothing is dropped: an event
//! either reaches the handler or its producer is cancelled while waiting.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::TagError;

#[async_trait]
pub trait EventHandler<E>: Send + Sync {
    async fn handle(&self, event: E);
}

pub fn mailbox<E>(capacity: usize) -> (Publisher<E>, flume::Receiver<E>) {
    let (tx, rx) = flume::bounded(capacity.max(1));
    (Publisher { tx }, rx)
}

pub struct Publisher<E> {
    tx: flume::Sender<E>,
}

impl<E> Clone for Publisher<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> Publisher<E> {
    /// Enqueue, waiting for space while the mailbox is full.
    pub async fn publish(&self, event: E, token: &CancellationToken) -> Result<(), TagError> {
        tokio::select! {
            sent = self.tx.send_async(event) => sent.map_err(|_| TagError::cancelled()),
            _ = token.cancelled() => Err(TagError::cancelled()),
        }
    }
}

/// Hand events to `handler` one at a time, in arrival order, until
/// cancelled or every publisher is gone. Returns how many were handled.
pub async fn dispatch_loop<E, H>(
    rx: flume::Receiver<E>,
    handler: Arc<H>,
    token: CancellationToken,
) -> usize
where
    E: Send,
    H: EventHandler<E> + ?Sized,
{
    let mut handled = 0;
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = rx.recv_async() => match received {
                Ok(event) => event,
                Err(_) => break,
            },
        };
        handler.handle(event).await;
        handled += 1;
    }
    log::debug!(
        "Dispatch loop stopped after {} event(s), {} left queued",
        handled,
        rx.len()
    );
    handled
}
