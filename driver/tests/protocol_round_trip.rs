//! S6: a client speaking the framed control protocol against a real TCP
//! listener round-trips route commands and terminates on the shutdown
//! sentinel, the same contract `driver` relies on.

use std::net::{TcpListener, TcpStream};
use std::thread;

use control_protocol::client::{send_route, send_shutdown};
use control_protocol::message::RouteCommand;
use control_protocol::server::serve_connection;
use switch_core::model::Endpoint;
use switch_core::route_table::RouteTable;

#[test]
fn commands_sent_over_a_real_socket_reach_the_route_table() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let routes = RouteTable::new();
        let (mut stream, _) = listener.accept().unwrap();
        let applied = serve_connection(&mut stream, &routes);
        (routes, applied)
    });

    let mut client = TcpStream::connect(addr).unwrap();
    let poa = 50_123;
    let dst = Endpoint { port: 9000, ip: [10, 1, 1, 1], mac: [2, 0, 0, 0, 0, 7] };
    send_route(&mut client, &RouteCommand::open(poa, dst)).unwrap();
    send_route(&mut client, &RouteCommand::close(poa)).unwrap();
    send_shutdown(&mut client).unwrap();

    let (routes, applied) = server.join().unwrap();
    assert_eq!(applied, 2);
    let route = routes.lookup(poa).unwrap();
    assert!(!route.open);
    assert_eq!(route.dst, dst);
}
