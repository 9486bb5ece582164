//! Per-worker forward loop (C4): drain one NIC queue, dispatch to forward,
//! TAP, or drop.

use std::sync::Arc;
use std::time::Duration;

use crate::constants::ETH_HDR_LEN;
use crate::model::{Route, WorkerCounters};
use crate::monitor::Monitor;
use crate::nic::{NicBuffer, NicDriver, SendError};
use crate::packet::checksum::rewrite_destination;
use crate::packet::parse::{PacketInfo, parse_frame};
use crate::route_table::RouteTable;
use crate::tap::Tap;

pub struct ForwardWorker<D: NicDriver> {
    pub index: usize,
    nic: Arc<D>,
    routes: Arc<RouteTable>,
    tap: Tap,
    pub counters: WorkerCounters,
}

impl<D: NicDriver> ForwardWorker<D> {
    pub fn new(index: usize, nic: Arc<D>, routes: Arc<RouteTable>, tap: Tap) -> Self {
        Self {
            index,
            nic,
            routes,
            tap,
            counters: WorkerCounters::new(),
        }
    }

    /// Registers the worker's queue (retrying `LinkDown` with a one-second
    /// delay per §7), runs the start/stop handshake on `monitor`, and
    /// busy-polls until the monitor alerts this worker to stop.
    pub fn run(&mut self, monitor: &Monitor) {
        loop {
            match self.nic.register(self.index) {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(worker = self.index, error = %e, "link down, retrying");
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }

        monitor.acknowledge(self.index);

        while !monitor.is_alerted(self.index) {
            self.poll_once();
        }

        self.nic.unregister(self.index);
        monitor.acknowledge(self.index);
    }

    fn poll_once(&mut self) {
        match self.nic.get_packet(self.index) {
            None => std::thread::yield_now(),
            Some(buf) => self.handle_packet(buf),
        }
    }

    fn handle_packet(&mut self, mut buf: NicBuffer) {
        let mac = self.nic.mac();
        let info = parse_frame(&buf, &mac);
        self.counters.record_status(info.status);

        if !info.is_udp_for_me() {
            if let Err(e) = self.tap.write(&buf) {
                tracing::warn!(worker = self.index, error = %e, "TAP write failed");
            }
            self.counters.tap += 1;
            return;
        }

        let Some(route) = self.routes.lookup(info.poa) else {
            // Logic bug per §7: a UDP-for-us poa that doesn't map to any
            // slot. Debug builds assert; release builds log and drop with
            // no route index to attribute the drop to.
            debug_assert!(false, "poa {} has no route slot", info.poa);
            tracing::error!(worker = self.index, poa = info.poa, "route lookup failed for UDP-for-us packet");
            return;
        };

        let idx = route.index as usize;
        self.counters.recv[idx] += 1;

        if !route.open {
            self.counters.drop[idx] += 1;
            return;
        }

        if self.rewrite_and_send(buf, &info, &route) {
            self.counters.send[idx] += 1;
        } else {
            self.counters.drop[idx] += 1;
        }
    }

    /// Rewrites the packet's destination in place and retries the send
    /// while the NIC reports `QueueFull`, per §4.3/§4.4.
    fn rewrite_and_send(&self, mut buf: NicBuffer, info: &PacketInfo, route: &Route) -> bool {
        rewrite_packet_in_place(&mut buf, info, route);

        let mut packet = buf;
        loop {
            match self.nic.send_packet(self.index, packet) {
                Ok(()) => return true,
                Err(SendError::QueueFull(back)) => {
                    packet = back;
                    std::thread::yield_now();
                }
                Err(SendError::Other(e)) => {
                    tracing::warn!(worker = self.index, error = %e, "NIC send failed");
                    return false;
                }
            }
        }
    }
}

/// Applies §4.3's write order: UDP port, then IP, then MAC, then UDP
/// checksum (if active), then IP checksum.
pub fn rewrite_packet_in_place(frame: &mut [u8], info: &PacketInfo, route: &Route) {
    let ip_off = ETH_HDR_LEN;
    let ihl = info.ip_hdr_size;
    let udp_off = ip_off + ihl;

    let old_dst_ip = [frame[ip_off + 16], frame[ip_off + 17], frame[ip_off + 18], frame[ip_off + 19]];
    let old_dst_port = u16::from_be_bytes([frame[udp_off + 2], frame[udp_off + 3]]);
    let old_ip_checksum = u16::from_be_bytes([frame[ip_off + 10], frame[ip_off + 11]]);
    let old_udp_checksum = u16::from_be_bytes([frame[udp_off + 6], frame[udp_off + 7]]);

    let new_dst_port = route.dst.port as u16;

    frame[udp_off + 2..udp_off + 4].copy_from_slice(&new_dst_port.to_be_bytes());
    frame[ip_off + 16..ip_off + 20].copy_from_slice(&route.dst.ip);
    frame[0..6].copy_from_slice(&route.dst.mac);

    let rewrite = rewrite_destination(
        old_ip_checksum,
        old_udp_checksum,
        old_dst_ip,
        route.dst.ip,
        old_dst_port,
        new_dst_port,
    );

    if let Some(udp_checksum) = rewrite.udp_checksum {
        frame[udp_off + 6..udp_off + 8].copy_from_slice(&udp_checksum.to_be_bytes());
    }
    frame[ip_off + 10..ip_off + 12].copy_from_slice(&rewrite.ip_checksum.to_be_bytes());
}
