//! End-to-end coverage of the control channel driving the route table and
//! the rewrite path together, the way the `switch` binary wires them.

use std::io::Cursor;

use control_protocol::frame::{write_message, write_shutdown};
use control_protocol::message::RouteCommand;
use control_protocol::server::serve_connection;
use switch_core::constants::{ETH_HDR_LEN, PORT_OFFSET};
use switch_core::model::Endpoint;
use switch_core::packet::parse_frame;
use switch_core::route_table::RouteTable;
use switch_core::worker::forward::rewrite_packet_in_place;

fn scripted_control_stream(commands: &[RouteCommand]) -> Cursor<Vec<u8>> {
    let mut buf = Vec::new();
    for cmd in commands {
        write_message(&mut buf, &cmd.to_json().unwrap()).unwrap();
    }
    write_shutdown(&mut buf).unwrap();
    Cursor::new(buf)
}

fn build_udp_frame(dst_mac: [u8; 6], src_mac: [u8; 6], dst_ip: [u8; 4], dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; ETH_HDR_LEN + 20 + 8 + payload.len()];
    frame[0..6].copy_from_slice(&dst_mac);
    frame[6..12].copy_from_slice(&src_mac);
    frame[12] = 0x08;
    frame[13] = 0x00;
    let l3 = &mut frame[ETH_HDR_LEN..];
    l3[0] = 0x45;
    l3[9] = 0x11;
    l3[16..20].copy_from_slice(&dst_ip);
    let udp = &mut l3[20..];
    udp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    let udp_len = (8 + payload.len()) as u16;
    udp[4..6].copy_from_slice(&udp_len.to_be_bytes());
    udp[8..].copy_from_slice(payload);
    frame
}

/// S1: a route opened over the control channel correctly rewrites a
/// matching packet's destination, and closing it flips the route to the
/// dropped state without otherwise altering its destination.
#[test]
fn open_then_close_a_route_through_the_control_channel() {
    let routes = RouteTable::new();
    let forward_mac = [2, 0, 0, 0, 0, 1];
    let poa = PORT_OFFSET;
    let dst = Endpoint { port: 7000, ip: [10, 0, 0, 9], mac: [2, 0, 0, 0, 0, 9] };

    let open = RouteCommand::open(poa, dst);
    let mut stream = scripted_control_stream(&[open]);
    let applied = serve_connection(&mut stream, &routes);
    assert_eq!(applied, 1);

    let mut frame = build_udp_frame(forward_mac, [1, 1, 1, 1, 1, 1], [172, 16, 0, 1], poa as u16, &[0xAB; 32]);
    let info = parse_frame(&frame, &forward_mac);
    assert!(info.is_udp_for_me());

    let route = routes.lookup(poa).unwrap();
    assert!(route.open);
    rewrite_packet_in_place(&mut frame, &info, &route);
    assert_eq!(&frame[0..6], &dst.mac);
    assert_eq!(&frame[ETH_HDR_LEN + 16..ETH_HDR_LEN + 20], &dst.ip);

    let close = RouteCommand::close(poa);
    let mut stream = scripted_control_stream(&[close]);
    serve_connection(&mut stream, &routes);
    let route = routes.lookup(poa).unwrap();
    assert!(!route.open);
    assert_eq!(route.dst, dst, "closing preserves the destination for diagnostics");
}

/// S4: a non-UDP frame (or UDP frame not addressed to our forwarding MAC)
/// never resolves to a route and must fall through to the TAP path.
#[test]
fn non_udp_frame_is_not_resolved_against_any_route() {
    let routes = RouteTable::new();
    let forward_mac = [2, 0, 0, 0, 0, 1];
    let poa = PORT_OFFSET + 5;
    routes.open(poa, Endpoint { port: 1, ip: [10, 0, 0, 1], mac: [2, 0, 0, 0, 0, 2] });

    let mut frame = build_udp_frame(forward_mac, [1, 1, 1, 1, 1, 1], [172, 16, 0, 1], poa as u16, &[0u8; 16]);
    frame[ETH_HDR_LEN + 9] = 0x06; // TCP, not UDP
    let info = parse_frame(&frame, &forward_mac);
    assert!(!info.is_udp_for_me());
}

/// Opening a route for a port-of-arrival outside the configured range is
/// rejected by the control server and never touches the route table.
#[test]
fn out_of_range_route_command_is_rejected() {
    let routes = RouteTable::new();
    let bad = RouteCommand::open(1, Endpoint { port: 1, ip: [10, 0, 0, 1], mac: [2, 0, 0, 0, 0, 1] });
    let mut stream = scripted_control_stream(&[bad]);
    let applied = serve_connection(&mut stream, &routes);
    assert_eq!(applied, 0);
}
