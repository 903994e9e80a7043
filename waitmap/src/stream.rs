//! Single-value stream over a pending read
//!
//! [`WaitMap::chan`](crate::WaitMap::chan) hands the caller a [`ValueStream`]
//! right away and resolves the read in the background. The background side
//! sends the value into a capacity-1 channel and drops the sender, so the
//! stream yields exactly one item and then ends.

use futures::Stream;
use std::hash::Hash;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::WaitMap;

/// Stream that yields the value of one key, then ends
///
/// Usable as a `futures::Stream`, with [`ValueStream::recv`] from async code,
/// or with [`ValueStream::blocking_recv`] from a plain thread.
#[derive(Debug)]
pub struct ValueStream<V> {
    receiver: mpsc::Receiver<V>,
}

impl<V> ValueStream<V> {
    /// Receive the value, or `None` once it was already received.
    pub async fn recv(&mut self) -> Option<V> {
        self.receiver.recv().await
    }

    /// Blocking variant of [`ValueStream::recv`].
    ///
    /// Panics if called inside an async runtime, like
    /// `tokio::sync::mpsc::Receiver::blocking_recv`.
    pub fn blocking_recv(&mut self) -> Option<V> {
        self.receiver.blocking_recv()
    }
}

impl<V> Stream for ValueStream<V> {
    type Item = V;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<V>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

/// Start waiting for `key` in the background and return the stream that
/// receives the result.
pub(crate) fn spawn_get<K, V>(map: WaitMap<K, V>, key: K) -> ValueStream<V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Default + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        runtime.spawn(async move {
            let value = map.get_async(&key).await;
            deliver(&tx, value, map.debug_hint());
        });
    } else {
        let spawned = std::thread::Builder::new()
            .name("waitmap-chan".to_string())
            .spawn(move || {
                let value = map.get(&key);
                deliver(&tx, value, map.debug_hint());
            });
        if let Err(e) = spawned {
            // The closure and its sender are gone, so the stream ends empty
            log::error!("waitmap.chan: failed to spawn resolver thread: {e}");
        }
    }

    ValueStream { receiver: rx }
}

fn deliver<V>(tx: &mpsc::Sender<V>, value: V, debug_hint: &str) {
    if tx.try_send(value).is_err() {
        log::debug!("waitmap.chan: stream dropped before the value arrived ({debug_hint})");
    }
}
