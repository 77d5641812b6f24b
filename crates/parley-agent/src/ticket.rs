//! Single-flight gate for queries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Hands out at most one [`QueryTicket`] at a time.
#[derive(Debug, Default)]
pub struct QueryGate {
    held: AtomicBool,
}

impl QueryGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take the ticket, or `None` if it is already out.
    pub fn try_acquire(self: &Arc<Self>) -> Option<QueryTicket> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                debug!("Query ticket acquired");
                QueryTicket {
                    gate: Arc::clone(self),
                }
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof that one query is in flight. Dropping it reopens the gate.
#[derive(Debug)]
pub struct QueryTicket {
    gate: Arc<QueryGate>,
}

impl Drop for QueryTicket {
    fn drop(&mut self) {
        self.gate.held.store(false, Ordering::Release);
        debug!("Query ticket released");
    }
}
