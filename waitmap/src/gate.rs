//! Per-key wait gate
//!
//! A gate starts `Pending` and becomes `Resolved` at most once, when the first
//! value for its key is stored. Async waiters park on a oneshot receiver that
//! the gate fires on resolve or release. Thread waiters do not register here:
//! they sleep on the container-wide condition variable and re-check their key
//! after every wake.

use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No value yet, readers block
    Pending,
    /// A value was stored, readers proceed immediately
    Resolved,
}

/// Async client parked on a gate
struct Waiter {
    /// Fired with `()` on resolve or release. Sending fails only when the
    /// waiting future was dropped, which is not an error for the gate.
    sender: oneshot::Sender<()>,
    debug_hint: String,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("debug_hint", &self.debug_hint)
            .finish_non_exhaustive()
    }
}

pub struct Gate {
    state: GateState,
    waiters: Vec<Waiter>,
}

impl Gate {
    #[must_use]
    pub fn pending() -> Self {
        Self {
            state: GateState::Pending,
            waiters: Vec::new(),
        }
    }

    #[must_use]
    pub fn resolved() -> Self {
        Self {
            state: GateState::Resolved,
            waiters: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state == GateState::Resolved
    }

    /// Number of async waiters still able to receive a wake-up
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters
            .iter()
            .filter(|w| !w.sender.is_closed())
            .count()
    }

    /// Register an async waiter and return the receiver it should await.
    ///
    /// Precondition: the caller holds the container lock, so the
    /// check-then-register step cannot race with `resolve`.
    pub fn register(&mut self, debug_hint: &str) -> oneshot::Receiver<()> {
        // Drop waiters whose futures were cancelled
        self.waiters.retain(|w| !w.sender.is_closed());

        let (tx, rx) = oneshot::channel();
        if self.is_resolved() {
            let _ = tx.send(());
        } else {
            self.waiters.push(Waiter {
                sender: tx,
                debug_hint: debug_hint.to_string(),
            });
        }
        rx
    }

    /// Transition `Pending` -> `Resolved` and wake every async waiter.
    ///
    /// Returns `false` if the gate was already resolved.
    pub fn resolve(&mut self) -> bool {
        if self.is_resolved() {
            return false;
        }
        self.state = GateState::Resolved;
        self.release();
        true
    }

    /// Wake every async waiter without changing the state.
    ///
    /// Returns the number of waiters that were still listening.
    pub fn release(&mut self) -> usize {
        let mut woken = 0;
        for waiter in self.waiters.drain(..) {
            if waiter.sender.send(()).is_ok() {
                woken += 1;
            } else {
                log::trace!("gate.release: waiter '{}' already gone", waiter.debug_hint);
            }
        }
        woken
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::pending()
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("state", &self.state)
            .field("waiters", &self.waiters.len())
            .finish()
    }
}
