//! `switch`: forwards UDP packets arriving on a fixed port range to
//! remote addresses, according to route commands sent over a framed TCP
//! control channel. Entry point only -- all forwarding logic lives in
//! `switch-core` and `control-protocol`.

use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use control_protocol::message::{format_ip, format_mac, parse_ip};
use control_protocol::server::serve_connection;
use core_affinity_ext::{ThreadRole, core_count, set_core_affinity};
use switch_core::constants::{CONTROL_PORT, CONVENIENCE_INTERFACE, PRODUCTION_INTERFACE};
use switch_core::counters::Summary;
use switch_core::monitor::Monitor;
use switch_core::netinfo::first_non_loopback_ipv4;
use switch_core::nic::{MAX_FRAME_SIZE, NicDriver, SoftwareNic};
use switch_core::route_table::RouteTable;
use switch_core::tap::Tap;
use switch_core::worker::forward::ForwardWorker;
use switch_core::worker::tap_bridge::TapBridgeWorker;

/// Forward UDP packets from input ports to remote addresses according to
/// route commands sent to the control port.
#[derive(Parser, Debug)]
#[command(name = "switch")]
struct Cli {
    /// IP address on which the switch forwards UDP packets.
    forward_ip: String,
    /// Network interface to use for UDP forwarding ('xgbe/0' or 'gbe/0').
    interface: String,
}

/// Queue index 0 is reserved for the TAP bridge; forward workers occupy
/// `1..=forward_worker_count`, mirroring the original's thread layout
/// (index 0 main, index 1 TAP, index 2.. forward workers) minus the main
/// thread's own queue, which this rewrite has no use for -- the switch
/// asks the NIC driver for its own MAC directly instead of registering a
/// queue just to read a parameter off it.
const TAP_QUEUE: usize = 0;

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
    let forward_ip = parse_ip(&cli.forward_ip).context("malformed forward IP")?;

    set_core_affinity(ThreadRole::Control);

    let forward_worker_count = core_count().saturating_sub(2).max(1);
    let total_queues = forward_worker_count + 1;

    let nic = Arc::new(SoftwareNic::open(&cli.interface, total_queues, TAP_QUEUE + 1).context("failed to open NIC")?);
    let tap = Tap::open(nic.mac(), forward_ip).context("failed to configure TAP device")?;
    let routes = Arc::new(RouteTable::new());
    let monitor = Arc::new(Monitor::new(total_queues));

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

    let targets: Vec<usize> = (0..total_queues).collect();
    monitor.raise_alert(&targets);

    let mut handles = Vec::with_capacity(total_queues);
    handles.push({
        let nic = nic.clone();
        let tap = tap.clone();
        let monitor = monitor.clone();
        thread::spawn(move || {
            set_core_affinity(ThreadRole::Tap);
            let mut worker = TapBridgeWorker::new(TAP_QUEUE, nic, tap);
            worker.run(&monitor);
            worker.counters
        })
    });
    for n in 0..forward_worker_count {
        let nic = nic.clone();
        let tap = tap.clone();
        let routes = routes.clone();
        let monitor = monitor.clone();
        let index = TAP_QUEUE + 1 + n;
        handles.push(thread::spawn(move || {
            set_core_affinity(ThreadRole::Forward(n));
            let mut worker = ForwardWorker::new(index, nic, routes, tap);
            worker.run(&monitor);
            worker.counters
        }));
    }

    monitor.wait_until_clear(&targets);
    tracing::info!(forward_workers = forward_worker_count, "worker cohort running");

    let control_ip = first_non_loopback_ipv4().unwrap_or([0, 0, 0, 0]);
    let listener = TcpListener::bind(("0.0.0.0", CONTROL_PORT)).context("failed to bind control port")?;
    announce_tester_command_line(&cli, control_ip, forward_ip, nic.mac());

    match listener.accept() {
        Ok((mut stream, peer)) => {
            tracing::info!(%peer, "control connection accepted");
            let applied = serve_connection(&mut stream, &routes);
            tracing::info!(applied, "control connection finished");
        }
        Err(e) => tracing::error!(error = %e, "failed to accept control connection"),
    }

    monitor.raise_alert(&targets);
    monitor.wait_until_clear(&targets);

    dispatcher_running.store(false, Ordering::Relaxed);
    if dispatcher.join().is_err() {
        tracing::error!("NIC dispatcher thread panicked");
    }

    let mut all_counters = Vec::with_capacity(handles.len());
    for h in handles {
        match h.join() {
            Ok(counters) => all_counters.push(counters),
            Err(_) => tracing::error!("worker thread panicked"),
        }
    }
    Summary::aggregate(&all_counters).log();

    Ok(())
}

/// Prints the operator banner the original `showTesterCommandLine` shows
/// once the control listener is bound, so a human at the console can copy
/// a working `tester`/`driver` invocation straight off the log (C10).
fn announce_tester_command_line(cli: &Cli, control_ip: [u8; 4], forward_ip: [u8; 4], mac: [u8; 6]) {
    let cip = format_ip(control_ip);
    let fip = format_ip(forward_ip);
    let macs = format_mac(mac);
    tracing::info!("Listening for commands on TCP {cip}:{CONTROL_PORT}");
    tracing::info!("Run ./tester {cip} {} {fip} {macs} <routes> <packets> <seconds>", cli.interface);
    tracing::info!("Or run ./driver {cip} {CONTROL_PORT}");
    tracing::info!("Send video UDP to {fip} ({macs})");
}
