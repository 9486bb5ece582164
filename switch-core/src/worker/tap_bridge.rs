//! TAP bridge worker (C5): reads frames the kernel wants to send on the
//! TAP interface and forwards them as L2 frames on a NIC queue.

use std::sync::Arc;

use crate::model::WorkerCounters;
use crate::monitor::Monitor;
use crate::nic::{NicDriver, SendError};
use crate::tap::Tap;

/// The TAP worker has a single logical "route" (slot 0 of its own
/// counters), matching §4.5's "update per-worker counters in slot 0".
pub struct TapBridgeWorker<D: NicDriver> {
    pub index: usize,
    nic: Arc<D>,
    tap: Tap,
    pub counters: WorkerCounters,
}

impl<D: NicDriver> TapBridgeWorker<D> {
    pub fn new(index: usize, nic: Arc<D>, tap: Tap) -> Self {
        Self {
            index,
            nic,
            tap,
            counters: WorkerCounters::new(),
        }
    }

    pub fn run(&mut self, monitor: &Monitor) {
        if let Err(e) = self.nic.register(self.index) {
            tracing::error!(worker = self.index, error = %e, "TAP bridge failed to register queue");
        }

        monitor.acknowledge(self.index);

        let mut scratch = [0u8; 8192];
        loop {
            if monitor.is_alerted(self.index) {
                break;
            }
            match self.tap.read(&mut scratch) {
                Ok(None) => std::thread::yield_now(),
                Ok(Some(0)) => {
                    tracing::info!(worker = self.index, "TAP device EOF, stopping bridge");
                    break;
                }
                Ok(Some(n)) => self.forward_to_nic(&scratch[..n]),
                Err(e) => {
                    tracing::warn!(worker = self.index, error = %e, "TAP read error");
                }
            }
        }

        self.nic.unregister(self.index);
        monitor.acknowledge(self.index);
    }

    fn forward_to_nic(&mut self, frame: &[u8]) {
        self.counters.recv[0] += 1;

        let mut buf = self.nic.get_buffer(frame.len());
        buf[..frame.len()].copy_from_slice(frame);

        let mut packet = buf;
        loop {
            match self.nic.send_packet(self.index, packet) {
                Ok(()) => {
                    self.counters.send[0] += 1;
                    return;
                }
                Err(SendError::QueueFull(back)) => {
                    packet = back;
                    std::thread::yield_now();
                }
                Err(SendError::Other(e)) => {
                    tracing::warn!(worker = self.index, error = %e, "TAP->NIC send failed");
                    self.counters.drop[0] += 1;
                    return;
                }
            }
        }
    }
}
