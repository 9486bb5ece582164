//! Process/thread lifecycle monitor (C8).
//!
//! One mutex, one condvar, and one `alert` flag per worker. `alert` serves
//! double duty: during start it's a barrier the worker clears once it has
//! registered its queue and entered its loop; during stop it's a request
//! the worker notices on its next poll and clears once torn down. This is
//! a deliberate divergence from the teacher's dominant `tokio`/`parking_lot`
//! idiom (§5: the monitor coordinates OS thread lifecycles, not futures),
//! kept as plain `std::sync` primitives to match the busy-poll, no-runtime
//! model §5 mandates.

use std::sync::{Condvar, Mutex};

pub struct Monitor {
    state: Mutex<Vec<bool>>,
    condvar: Condvar,
}

impl Monitor {
    pub fn new(worker_count: usize) -> Self {
        Self {
            state: Mutex::new(vec![false; worker_count]),
            condvar: Condvar::new(),
        }
    }

    /// Sets every target worker's `alert` and wakes anyone waiting on it.
    /// Used both to request a start handshake and a stop handshake.
    pub fn raise_alert(&self, targets: &[usize]) {
        let mut state = self.state.lock().unwrap();
        for &t in targets {
            state[t] = true;
        }
        self.condvar.notify_all();
    }

    /// Blocks until every target worker has cleared its `alert`.
    pub fn wait_until_clear(&self, targets: &[usize]) {
        let guard = self.state.lock().unwrap();
        let _guard = self
            .condvar
            .wait_while(guard, |state| targets.iter().any(|&t| state[t]))
            .unwrap();
    }

    /// Called by a worker to acknowledge a start or stop request: clear its
    /// own alert under the lock and broadcast.
    pub fn acknowledge(&self, worker: usize) {
        let mut state = self.state.lock().unwrap();
        state[worker] = false;
        self.condvar.notify_all();
    }

    pub fn is_alerted(&self, worker: usize) -> bool {
        self.state.lock().unwrap()[worker]
    }
}
