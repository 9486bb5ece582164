//! `tester`: opens self-loop routes on a running switch and drives UDP
//! traffic through them to validate forwarding end to end (C9).

mod generator;

use std::io::Write;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use control_protocol::client::{send_route, send_shutdown};
use control_protocol::message::{RouteCommand, parse_ip, parse_mac};
use core_affinity_ext::{ThreadRole, set_core_affinity};
use switch_core::constants::{CONTROL_PORT, CONVENIENCE_INTERFACE, PORT_OFFSET, PRODUCTION_INTERFACE};
use switch_core::model::Endpoint;
use switch_core::netinfo::first_non_loopback_ipv4;
use switch_core::nic::{MAX_FRAME_SIZE, NicDriver, SendError, SoftwareNic};

use generator::Generator;

/// Opens `routes` self-loop routes on a switch's control port and pumps
/// test traffic through them for `seconds`.
#[derive(Parser, Debug)]
#[command(name = "tester")]
struct Cli {
    /// Control-plane IP of the switch under test.
    control_ip: String,
    /// Network interface to send/receive UDP test traffic on.
    interface: String,
    /// IP address the switch is forwarding to (used only to validate a
    /// matching route configuration; not otherwise sent on the wire).
    forward_ip: String,
    /// MAC address of the switch's forwarding interface.
    switch_mac: String,
    /// Number of routes to open, starting at the first data-plane port.
    #[arg(default_value_t = 3840)]
    routes: usize,
    /// Packets to send per route before that route goes quiet.
    #[arg(default_value_t = 9999)]
    packets: u64,
    /// How long to run the send/receive loop.
    #[arg(default_value_t = 99)]
    seconds: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    if cli.interface != PRODUCTION_INTERFACE && cli.interface != CONVENIENCE_INTERFACE {
        bail!(
            "interface must be '{PRODUCTION_INTERFACE}' or '{CONVENIENCE_INTERFACE}', got '{}'",
            cli.interface
        );
    }
    let switch_ip = parse_ip(&cli.forward_ip).context("malformed forward IP")?;
    let switch_mac = parse_mac(&cli.switch_mac).context("malformed switch MAC")?;

    set_core_affinity(ThreadRole::Forward(0));

    let nic = Arc::new(SoftwareNic::open(&cli.interface, 1, 0).context("failed to open NIC")?);
    let self_mac = nic.mac();
    let self_ip = first_non_loopback_ipv4().context("failed to discover our own IP")?;

    // The tester has no per-core worker cohort of its own, but still needs
    // something reading the raw socket into queue 0 -- the same
    // `dispatch_once` loop `switch`'s main.rs runs for its forward workers.
    let dispatcher_running = Arc::new(AtomicBool::new(true));
    let dispatcher = {
        let nic = nic.clone();
        let running = dispatcher_running.clone();
        thread::spawn(move || {
            let mut scratch = [0u8; MAX_FRAME_SIZE];
            while running.load(Ordering::Relaxed) {
                if let Err(e) = nic.dispatch_once(&mut scratch) {
                    tracing::warn!(error = %e, "NIC dispatch error");
                }
                thread::yield_now();
            }
        })
    };

    let mut control = TcpStream::connect((cli.control_ip.as_str(), CONTROL_PORT))
        .context("failed to connect to the switch's control port")?;

    let mut generator = Generator::new(self_mac, self_ip, switch_mac, switch_ip, PORT_OFFSET, cli.routes, cli.packets);

    for i in 0..generator.route_count() {
        let poa = generator.poa_for_index(i);
        let dst = Endpoint { port: poa, ip: self_ip, mac: self_mac };
        send_route(&mut control, &RouteCommand::open(poa, dst)).context("failed to send open route command")?;
    }
    tracing::info!(routes = generator.route_count(), "routes opened");

    // Prime the pipeline: send one packet per route so the switch has
    // something to bounce back before we start polling for replies.
    for i in 0..generator.route_count() {
        send_with_retry(&nic, generator.build_packet(i));
        generator.record_sent(i);
    }

    let deadline = Instant::now() + Duration::from_secs(cli.seconds);
    let mut scratch_pending = Vec::new();
    while Instant::now() < deadline {
        match nic.get_packet(0) {
            None => thread::yield_now(),
            Some(buf) => {
                if let Some(index) = generator.handle_receive(&buf) {
                    scratch_pending.push(index);
                }
            }
        }
        for index in scratch_pending.drain(..) {
            send_with_retry(&nic, generator.build_packet(index));
            generator.record_sent(index);
        }
    }

    for i in 0..generator.route_count() {
        let poa = generator.poa_for_index(i);
        send_route(&mut control, &RouteCommand::close(poa)).context("failed to send close route command")?;
    }
    send_shutdown(&mut control).context("failed to send shutdown sentinel")?;
    control.flush().ok();

    dispatcher_running.store(false, Ordering::Relaxed);
    if dispatcher.join().is_err() {
        tracing::error!("NIC dispatcher thread panicked");
    }

    log_final_counters(&generator);

    Ok(())
}

fn send_with_retry(nic: &SoftwareNic, frame: Vec<u8>) {
    let mut buf = nic.get_buffer(frame.len());
    buf[..frame.len()].copy_from_slice(&frame);

    let mut packet = buf;
    loop {
        match nic.send_packet(0, packet) {
            Ok(()) => return,
            Err(SendError::QueueFull(back)) => {
                packet = back;
                thread::yield_now();
            }
            Err(SendError::Other(e)) => {
                tracing::warn!(error = %e, "failed to send test packet");
                return;
            }
        }
    }
}

fn log_final_counters(generator: &Generator) {
    let mut sent = 0u64;
    let mut recv = 0u64;
    let mut drop = 0u64;
    for c in &generator.counters {
        sent += c.sent;
        recv += c.recv;
        drop += c.drop;
    }
    tracing::info!(sent, recv, drop, "tester finished");
}
