//! Shared value types that cross the route table / packet plane / control
//! channel boundary.

use serde::{Deserialize, Serialize};

use crate::constants::{N, PORT_OFFSET};

/// A destination the forwarder can rewrite a packet towards, or the
/// switch's own identity on the fast path.
///
/// `port == -1` denotes "no destination" in the wire protocol; callers that
/// need that sentinel translate at the edge via [`Endpoint::is_closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub port: i32,
    pub ip: [u8; 4],
    pub mac: [u8; 6],
}

impl Endpoint {
    pub const CLOSED: Endpoint = Endpoint {
        port: -1,
        ip: [0; 4],
        mac: [0; 6],
    };

    pub fn is_closed(&self) -> bool {
        self.port < 0
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::CLOSED
    }
}

/// One slot of the route table.
///
/// Invariants upheld by [`crate::route_table::RouteTable`]: `index` is dense
/// in `[0, N)`; `poa == PORT_OFFSET + index`; `open` implies
/// `dst.port >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub index: i32,
    pub poa: i32,
    pub dst: Endpoint,
    pub open: bool,
}

impl Route {
    pub fn closed_at(index: usize) -> Self {
        Route {
            index: index as i32,
            poa: PORT_OFFSET + index as i32,
            dst: Endpoint::CLOSED,
            open: false,
        }
    }

    /// Maps a port-of-arrival to its slot index, or `None` if out of range.
    pub fn slot_index(poa: i32) -> Option<usize> {
        let idx = poa - PORT_OFFSET;
        if idx >= 0 && (idx as usize) < N {
            Some(idx as usize)
        } else {
            None
        }
    }
}

/// The outcome of classifying one received frame; recorded in the worker's
/// status histogram and used to decide forward / TAP / drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    /// Frame parsed as a UDP datagram addressed to our forwarding MAC.
    UdpForUs,
    /// Frame is not UDP-for-us; destined for the TAP bridge.
    NotUdpForUs,
    /// UDP-for-us, but its `poa` does not map to any route slot.
    BadPortOfArrival,
    /// UDP-for-us, route slot exists but is closed.
    RouteClosed,
    /// The NIC driver reported an error fetching or sending this packet.
    NicError,
}

impl PacketStatus {
    pub const COUNT: usize = 5;

    pub fn as_index(self) -> usize {
        match self {
            PacketStatus::UdpForUs => 0,
            PacketStatus::NotUdpForUs => 1,
            PacketStatus::BadPortOfArrival => 2,
            PacketStatus::RouteClosed => 3,
            PacketStatus::NicError => 4,
        }
    }
}

/// Per-worker, per-route packet counters. Owned by the worker; merged into
/// a process-wide [`crate::counters::Summary`] only after shutdown.
pub struct WorkerCounters {
    pub recv: Box<[u64; N]>,
    pub send: Box<[u64; N]>,
    pub drop: Box<[u64; N]>,
    pub status: [u64; PacketStatus::COUNT],
    pub tap: u64,
}

impl WorkerCounters {
    pub fn new() -> Self {
        Self {
            recv: Box::new([0; N]),
            send: Box::new([0; N]),
            drop: Box::new([0; N]),
            status: [0; PacketStatus::COUNT],
            tap: 0,
        }
    }

    pub fn record_status(&mut self, status: PacketStatus) {
        self.status[status.as_index()] += 1;
    }
}

impl Default for WorkerCounters {
    fn default() -> Self {
        Self::new()
    }
}
