//! Wait map
//!
//! Thread-safe map where reading a missing key waits until some other thread
//! or task stores a value for it.
//!
//! # Waiting without missing a wake-up
//!
//! A reader has to check for the value and start waiting as one atomic step,
//! otherwise a writer running on another thread can store the value and wake
//! the waiters between the check and the registration, and the reader then
//! sleeps forever. Both reader flavors therefore do the check and the
//! registration under the container lock:
//!
//! - `get` parks on the container-wide `Condvar`, which releases the lock
//!   atomically. The condvar is shared by all keys, so a wake-up only means
//!   "something changed" and the reader re-checks its own key in a loop.
//! - `get_async` registers a oneshot sender on the key's gate, drops the lock,
//!   then awaits the receiver. The writer fires the sender under the same lock,
//!   so either the reader sees the value or its sender is already registered.
//!
//! # Gate lifecycle
//!
//! ```text
//!   (no gate) --get/get_async--> Pending --set/try_set--> Resolved
//!       ^                           |                        |
//!       +---------- delete ---------+------------------------+
//! ```
//!
//! `delete` on a pending gate wakes its waiters, which find neither a value nor
//! a gate, open a fresh `Pending` gate and go back to sleep until the next
//! `set`. `close` resolves every pending gate and makes every read return
//! `V::default()` from then on.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::gate::Gate;
use crate::stream::{self, ValueStream};

// ============================================================================
// Internal State
// ============================================================================

struct InnerState<K, V> {
    store: HashMap<K, V>,
    gates: HashMap<K, Gate>,
    closed: bool,
}

impl<K, V> InnerState<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Default,
{
    fn new() -> Self {
        Self {
            store: HashMap::new(),
            gates: HashMap::new(),
            closed: false,
        }
    }

    /// Either the value a reader should return now, or the pending gate it
    /// should wait on. Creates the gate if the key was never referenced.
    fn value_or_gate(&mut self, key: &K) -> Result<V, &mut Gate> {
        if self.closed {
            return Ok(V::default());
        }
        if let Some(value) = self.store.get(key) {
            return Ok(value.clone());
        }
        let gate = self.gates.entry(key.clone()).or_default();
        assert!(
            !gate.is_resolved(),
            "waitmap: gate is resolved but no value is stored for the key"
        );
        Err(gate)
    }
}

struct Shared<K, V> {
    state: Mutex<InnerState<K, V>>,
    /// Wakes thread readers parked in `get`. Shared by all keys.
    cond: Condvar,
    debug_hint: String,
}

// ============================================================================
// Wait Map
// ============================================================================

/// Thread-safe map whose reads wait for a value to be written
///
/// `WaitMap` is a handle: clones share the same contents. Separately
/// constructed maps are independent.
///
/// # Example
///
/// ```
/// use waitmap::WaitMap;
///
/// let map: WaitMap<String, i64> = WaitMap::new();
///
/// let reader = {
///     let map = map.clone();
///     std::thread::spawn(move || map.get(&"foo".to_string()))
/// };
///
/// map.set("foo".to_string(), 123);
/// assert_eq!(reader.join().unwrap(), 123);
/// ```
pub struct WaitMap<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for WaitMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> WaitMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Default,
{
    /// Create a new empty, open map
    #[must_use]
    pub fn new() -> Self {
        Self::with_hint("")
    }

    /// Create a new empty, open map labelled with `debug_hint` in logs
    #[must_use]
    pub fn with_hint(debug_hint: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(InnerState::new()),
                cond: Condvar::new(),
                debug_hint: debug_hint.to_string(),
            }),
        }
    }

    /// Label given at construction, empty for `WaitMap::new`
    #[must_use]
    pub fn debug_hint(&self) -> &str {
        &self.shared.debug_hint
    }

    /// Get the value for `key`, blocking the current thread until it is set.
    ///
    /// Returns `V::default()` if the map is closed, either before the call or
    /// while waiting. Must not be called from an async task; use
    /// [`WaitMap::get_async`] there.
    pub fn get(&self, key: &K) -> V {
        let mut state = self.shared.state.lock();
        loop {
            if let Ok(value) = state.value_or_gate(key) {
                return value;
            }
            log::trace!("waitmap.get: thread parked ({})", self.shared.debug_hint);
            self.shared.cond.wait(&mut state);
        }
    }

    /// Get the value for `key`, waiting asynchronously until it is set.
    ///
    /// Same contract as [`WaitMap::get`]. Dropping the future abandons the
    /// wait; the gate forgets the abandoned waiter on its next registration.
    pub async fn get_async(&self, key: &K) -> V {
        loop {
            let rx = {
                let mut state = self.shared.state.lock();
                let rx = match state.value_or_gate(key) {
                    Ok(value) => return value,
                    Err(gate) => gate.register(&self.shared.debug_hint),
                };
                // Lock released here, before awaiting
                rx
            };
            log::trace!("waitmap.get_async: task parked ({})", self.shared.debug_hint);

            // The sender is always fired before its gate is dropped, so an
            // error here is impossible while `self` is alive. Either way the
            // loop re-checks the state.
            let _ = rx.await;
        }
    }

    /// Get the value for `key` if one is stored, without waiting.
    ///
    /// Returns `None` on a closed map.
    #[must_use]
    pub fn try_get(&self, key: &K) -> Option<V> {
        let state = self.shared.state.lock();
        if state.closed {
            return None;
        }
        state.store.get(key).cloned()
    }

    /// Store `value` under `key`, overwriting any previous value.
    ///
    /// Wakes every reader waiting for the key if this is its first value.
    /// Does nothing on a closed map.
    pub fn set(&self, key: K, value: V) {
        let mut state = self.shared.state.lock();
        if state.closed {
            log::warn!("waitmap.set: map is closed ({})", self.shared.debug_hint);
            return;
        }

        let InnerState { store, gates, .. } = &mut *state;
        let gate = gates.entry(key.clone()).or_insert_with(Gate::resolved);
        let waiters = gate.waiter_count();
        let first_value = gate.resolve();
        store.insert(key, value);
        drop(state);

        if first_value {
            log::debug!(
                "waitmap.set: gate resolved ({}), async waiters: {}",
                self.shared.debug_hint,
                waiters
            );
            self.shared.cond.notify_all();
        }
    }

    /// Store `value` under `key` only if the key was never referenced.
    ///
    /// Fails if a gate exists for the key, which is the case once it was set
    /// or once a reader started waiting for it. Returns `false` on a closed
    /// map.
    #[must_use]
    pub fn try_set(&self, key: K, value: V) -> bool {
        let mut state = self.shared.state.lock();
        if state.closed {
            log::warn!("waitmap.try_set: map is closed ({})", self.shared.debug_hint);
            return false;
        }
        if state.gates.contains_key(&key) {
            return false;
        }
        state.gates.insert(key.clone(), Gate::resolved());
        state.store.insert(key, value);
        true
    }

    /// Remove the value and the gate for `key`.
    ///
    /// Readers waiting for the key are woken and go back to waiting for the
    /// next `set`. Does nothing if the key was never referenced or the map is
    /// closed.
    pub fn delete(&self, key: &K) {
        let mut state = self.shared.state.lock();
        if state.closed {
            log::warn!("waitmap.delete: map is closed ({})", self.shared.debug_hint);
            return;
        }
        state.store.remove(key);
        let Some(mut gate) = state.gates.remove(key) else {
            return;
        };
        let woken = gate.release();
        drop(state);

        if !gate.is_resolved() {
            log::debug!(
                "waitmap.delete: pending gate dropped ({}), async waiters: {}",
                self.shared.debug_hint,
                woken
            );
            self.shared.cond.notify_all();
        }
    }

    /// Snapshot of the keys that currently hold a value, in no particular order.
    ///
    /// Keys that only have waiting readers are not included. Empty on a
    /// closed map.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        let state = self.shared.state.lock();
        if state.closed {
            return Vec::new();
        }
        state.store.keys().cloned().collect()
    }

    /// Close the map, releasing every waiting reader with `V::default()`.
    ///
    /// All values and gates are discarded and every later operation becomes
    /// a no-op. Closing twice has no further effect.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            log::debug!("waitmap.close: already closed ({})", self.shared.debug_hint);
            return;
        }
        state.closed = true;

        let mut pending = 0;
        for gate in state.gates.values_mut() {
            if gate.resolve() {
                pending += 1;
            }
        }
        let values = state.store.len();
        state.gates.clear();
        state.store.clear();
        drop(state);

        log::debug!(
            "waitmap.close: ({}) pending gates released: {}, values dropped: {}",
            self.shared.debug_hint,
            pending,
            values
        );
        self.shared.cond.notify_all();
    }

    /// Whether [`WaitMap::close`] was called on this map or one of its clones
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl<K, V> WaitMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Default + Send + 'static,
{
    /// Get the value for `key` as a stream of exactly one item.
    ///
    /// Returns immediately. The wait happens in the background: on a tokio
    /// task when called inside a runtime, on a dedicated thread otherwise.
    /// The stream yields the value, then ends.
    #[must_use]
    pub fn chan(&self, key: K) -> ValueStream<V> {
        stream::spawn_get(self.clone(), key)
    }
}

impl<K, V> Default for WaitMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for WaitMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("WaitMap")
            .field("debug_hint", &self.shared.debug_hint)
            .field("closed", &state.closed)
            .field("values", &state.store.len())
            .field("gates", &state.gates.len())
            .finish()
    }
}
