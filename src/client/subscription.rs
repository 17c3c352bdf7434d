//! Consumer side of an observation.

use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures::Stream;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use super::ClientInner;
use crate::bridge::Update;
use crate::bridge::protocol::{CallId, decode};
use crate::error::ClientResult;
use crate::transport::Transport;

/// Ordered stream of updates for one observation.
///
/// Yields `Ok(value)` per update and `Err(_)` per failure. Decode failures
/// are reported and the stream continues. Any other error is the last item:
/// the subscription is unobserved and the stream ends.
///
/// Cancelling (explicitly or by dropping) unobserves exactly once; updates
/// already buffered are discarded.
pub struct Subscription<R, T: Transport> {
    id: CallId,
    rx: mpsc::UnboundedReceiver<ClientResult<Update>>,
    client: Weak<ClientInner<T>>,
    last_checksum: Option<u64>,
    cancelled: bool,
    finished: bool,
    _value: PhantomData<fn() -> R>,
}

impl<R, T: Transport> Subscription<R, T> {
    pub(super) fn new(
        id: CallId,
        rx: mpsc::UnboundedReceiver<ClientResult<Update>>,
        client: Weak<ClientInner<T>>,
    ) -> Self {
        Self {
            id,
            rx,
            client,
            last_checksum: None,
            cancelled: false,
            finished: false,
            _value: PhantomData,
        }
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    /// Checksum of the most recently yielded update.
    pub fn checksum(&self) -> Option<u64> {
        self.last_checksum
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Stop the observation. Only the first call has an effect.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.finished = true;
        if let Some(client) = self.client.upgrade() {
            client.unobserve(self.id);
        }
        self.rx.close();
    }
}

impl<R: DeserializeOwned, T: Transport> Subscription<R, T> {
    /// Wait for the next item; `None` once the stream has ended.
    pub async fn next_update(&mut self) -> Option<ClientResult<R>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }
}

impl<R: DeserializeOwned, T: Transport> Stream for Subscription<R, T> {
    type Item = ClientResult<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Ok(update))) => {
                this.last_checksum = Some(update.checksum);
                Poll::Ready(Some(decode(&update.data)))
            }
            Poll::Ready(Some(Err(err))) => {
                if err.is_terminal() {
                    this.cancel();
                }
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

impl<R, T: Transport> Drop for Subscription<R, T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<R, T: Transport> fmt::Debug for Subscription<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("last_checksum", &self.last_checksum)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}
