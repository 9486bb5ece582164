//! The fixed-size, single-writer/many-reader forwarding table keyed by
//! port-of-arrival.
//!
//! Each slot is an [`arc_swap::ArcSwap`] rather than a `Mutex`: a forwarder
//! reads a slot with a single atomic pointer load and gets a fully formed
//! [`Route`] snapshot, never a torn mix of an old `dst` and a new `open` (or
//! vice versa), because both fields live behind the same pointer swap.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::constants::N;
use crate::model::{Endpoint, Route};

pub struct RouteTable {
    slots: Box<[ArcSwap<Route>]>,
}

impl RouteTable {
    /// Builds a table with every slot closed, per C1's `initialize()`.
    pub fn new() -> Self {
        let slots = (0..N)
            .map(|i| ArcSwap::from_pointee(Route::closed_at(i)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self { slots }
    }

    /// Opens (or replaces) the route at `r.poa`, overwriting `dst` and
    /// setting `open = true`. No-op returning `false` if `r.poa` is out of
    /// range.
    pub fn open(&self, poa: i32, dst: Endpoint) -> bool {
        let Some(index) = Route::slot_index(poa) else {
            return false;
        };

        self.slots[index].store(Arc::new(Route {
            index: index as i32,
            poa,
            dst,
            open: true,
        }));
        true
    }

    /// Clears `open` for the route at `poa`, leaving `dst` intact for
    /// diagnostics. No-op returning `false` if `r.poa` is out of range.
    ///
    /// Unlike the original, closing an already-closed slot is simply a
    /// second no-op write rather than dead bounds-mismatch code: the route
    /// a worker sees never desyncs from its own index, so there is nothing
    /// left to special-case here.
    pub fn close(&self, poa: i32) -> bool {
        let Some(index) = Route::slot_index(poa) else {
            return false;
        };

        let current = self.slots[index].load();
        self.slots[index].store(Arc::new(Route {
            index: current.index,
            poa: current.poa,
            dst: current.dst,
            open: false,
        }));
        true
    }

    /// Returns a snapshot of the route for `poa`, or `None` if `poa` is out
    /// of range or the slot's own `poa` does not match (should never
    /// happen given the invariants `open`/`close` maintain).
    pub fn lookup(&self, poa: i32) -> Option<Route> {
        let index = Route::slot_index(poa)?;
        let route = *self.slots[index].load_full();
        (route.poa == poa).then_some(route)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
