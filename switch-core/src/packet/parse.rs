//! Ethernet/IPv4/UDP header classification (C2).
//!
//! This is a pure function over the received bytes. The original's two
//! "read-side cache invalidate" calls (one over the 42-byte minimal prefix,
//! one over the classified header span) have no counterpart here: on a
//! software NIC the kernel already makes the buffer's contents visible
//! before handing it back to us. A real zero-copy [`crate::nic::NicDriver`]
//! that needs an explicit DMA-sync barrier would insert it at the same two
//! points this function reads from.

use crate::constants::{ETH_HDR_LEN, MIN_IPV4_UDP_LEN};
use crate::model::PacketStatus;

/// Derived, ephemeral classification of one received frame. Never stored;
/// produced fresh per packet.
#[derive(Debug, Clone, Copy)]
pub struct PacketInfo {
    pub status: PacketStatus,
    /// Port of arrival, meaningful only when `status == UdpForUs`.
    pub poa: i32,
    /// Offset of the IPv4 header length (IHL) field expressed in bytes.
    pub ip_hdr_size: usize,
    /// Offset from the start of `l2_data` to the first byte after all
    /// parsed headers (UDP-for-us) or just the Ethernet header otherwise.
    pub all_headers_size: usize,
}

impl PacketInfo {
    pub fn is_udp_for_me(&self) -> bool {
        self.status == PacketStatus::UdpForUs
    }
}

/// Classifies a received L2 frame.
///
/// `forward_mac` is this process's own forwarding MAC (the destination the
/// frame must be addressed to in order to count as UDP-for-us).
pub fn parse_frame(frame: &[u8], forward_mac: &[u8; 6]) -> PacketInfo {
    let l3 = &frame[ETH_HDR_LEN.min(frame.len())..];

    let looks_like_udp_for_us = l3.len() > MIN_IPV4_UDP_LEN
        && (l3[0] >> 4) == 4
        && l3[9] == 0x11
        && frame.len() >= 6
        && &frame[0..6] == forward_mac;

    // The IHL nibble is attacker-controllable and can claim an IPv4 header
    // up to 60 bytes even when `l3` itself is barely longer than
    // `MIN_IPV4_UDP_LEN`; re-check bounds against the *claimed* header size
    // before indexing into the UDP port field, or fall through to
    // not-for-us rather than panicking the worker that parses this frame.
    // `looks_like_udp_for_us` already guarantees `l3` is non-empty here.
    let ip_hdr_size = if looks_like_udp_for_us { 4 * (l3[0] & 0x0f) as usize } else { 0 };
    let udp_for_us = looks_like_udp_for_us && l3.len() >= ip_hdr_size + 8;

    if udp_for_us {
        let all_headers_size = ETH_HDR_LEN + ip_hdr_size + 8;
        let poa = ((l3[ip_hdr_size + 2] as i32) << 8) | (l3[ip_hdr_size + 3] as i32);

        PacketInfo {
            status: PacketStatus::UdpForUs,
            poa,
            ip_hdr_size,
            all_headers_size,
        }
    } else {
        PacketInfo {
            status: PacketStatus::NotUdpForUs,
            poa: 0,
            ip_hdr_size: 20,
            all_headers_size: ETH_HDR_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_frame(poa: u16, mac: [u8; 6]) -> Vec<u8> {
        let mut frame = vec![0u8; 42 + 4];
        frame[0..6].copy_from_slice(&mac); // dst mac
        frame[6..12].copy_from_slice(&[1, 1, 1, 1, 1, 1]); // src mac
        frame[12] = 0x08;
        frame[13] = 0x00; // ethertype IPv4
        let l3 = &mut frame[14..];
        l3[0] = 0x45; // version 4, IHL 5
        l3[9] = 0x11; // UDP
        l3[20 + 2] = (poa >> 8) as u8;
        l3[20 + 3] = (poa & 0xff) as u8;
        frame
    }

    #[test]
    fn recognizes_udp_for_us() {
        let mac = [2, 0, 0, 0, 0, 1];
        let frame = udp_frame(50123, mac);
        let info = parse_frame(&frame, &mac);
        assert!(info.is_udp_for_me());
        assert_eq!(info.poa, 50123);
        assert_eq!(info.ip_hdr_size, 20);
        assert_eq!(info.all_headers_size, 14 + 20 + 8);
    }

    #[test]
    fn wrong_destination_mac_is_not_for_us() {
        let mac = [2, 0, 0, 0, 0, 1];
        let frame = udp_frame(50123, [9, 9, 9, 9, 9, 9]);
        let info = parse_frame(&frame, &mac);
        assert!(!info.is_udp_for_me());
    }

    #[test]
    fn non_udp_protocol_spills_to_tap() {
        let mac = [2, 0, 0, 0, 0, 1];
        let mut frame = udp_frame(50123, mac);
        frame[14 + 9] = 0x06; // TCP
        let info = parse_frame(&frame, &mac);
        assert!(!info.is_udp_for_me());
        assert_eq!(info.all_headers_size, ETH_HDR_LEN);
    }

    #[test]
    fn short_frame_is_not_for_us() {
        let mac = [2, 0, 0, 0, 0, 1];
        let frame = vec![0u8; 20];
        let info = parse_frame(&frame, &mac);
        assert!(!info.is_udp_for_me());
    }

    #[test]
    fn oversized_ihl_past_the_buffer_end_does_not_panic() {
        let mac = [2, 0, 0, 0, 0, 1];
        let mut frame = udp_frame(50123, mac);
        // Claim the maximum IHL (60-byte IPv4 header) while the frame only
        // has room for the minimal 20-byte header plus UDP header: the old
        // code indexed the port fields at this claimed offset unconditionally.
        frame[14] = 0x4f; // version 4, IHL 15 -> 60-byte header
        let info = parse_frame(&frame, &mac);
        assert!(!info.is_udp_for_me());
    }
}
