//! `driver`: reads JSON route commands from stdin, one record at a time,
//! and forwards each to a switch's control port (C6/C10).
//!
//! Mirrors the original `routeFromStream`'s behavior of accumulating
//! input until a complete record parses, but does so with a real JSON
//! parser rather than a `scanf` format string, so whitespace and field
//! order don't matter and an unknown field is rejected outright instead
//! of silently ignored.

use std::io::{self, BufRead, Write};
use std::net::TcpStream;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use control_protocol::client::{send_route, send_shutdown};
use control_protocol::message::RouteCommand;
use switch_core::constants::CONTROL_PORT;

/// Reads JSON route commands from stdin and sends them to a switch's
/// control port, one per line (or spanning several lines).
#[derive(Parser, Debug)]
#[command(name = "driver")]
struct Cli {
    /// Control-plane IP of the switch to drive.
    control_ip: String,
    /// TCP port of the switch's control channel.
    #[arg(default_value_t = CONTROL_PORT)]
    port: u16,
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
    let mut control =
        TcpStream::connect((cli.control_ip.as_str(), cli.port)).context("failed to connect to the switch's control port")?;

    let stdin = io::stdin();
    let mut pending = String::new();
    let mut sent = 0usize;

    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        match accumulate(&mut pending, &line) {
            Accumulated::Command(cmd) => {
                send_route(&mut control, &cmd).context("failed to send route command")?;
                sent += 1;
            }
            Accumulated::Dropped(record) => {
                tracing::warn!(record = %record, "dropping unparsable route record");
            }
            Accumulated::Pending => {}
        }
    }

    send_shutdown(&mut control).context("failed to send shutdown sentinel")?;
    control.flush().ok();
    tracing::info!(sent, "driver finished, stdin closed");

    Ok(())
}

enum Accumulated {
    Command(RouteCommand),
    Dropped(String),
    Pending,
}

/// Folds one more line of stdin into `pending` and reports what happened.
///
/// Mirrors the original's line-accumulation loop: a record may span
/// several lines, so a parse failure alone doesn't mean the record is
/// garbage -- only a blank line with nothing parseable accumulated does.
fn accumulate(pending: &mut String, line: &str) -> Accumulated {
    pending.push_str(line);
    pending.push('\n');

    match RouteCommand::from_json(pending.as_bytes()) {
        Ok(cmd) => {
            pending.clear();
            Accumulated::Command(cmd)
        }
        Err(_) if line.trim().is_empty() => {
            let record = pending.trim().to_string();
            pending.clear();
            Accumulated::Dropped(record)
        }
        Err(_) => Accumulated::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_record_parses_immediately() {
        let mut pending = String::new();
        let line = r#"{"from":50000,"port":6000,"ip":"10.0.0.1","mac":"02:00:00:00:00:01"}"#;
        match accumulate(&mut pending, line) {
            Accumulated::Command(cmd) => assert_eq!(cmd.from, 50000),
            _ => panic!("expected a parsed command"),
        }
        assert!(pending.is_empty());
    }

    #[test]
    fn record_spanning_multiple_lines_accumulates_until_complete() {
        let mut pending = String::new();
        assert!(matches!(accumulate(&mut pending, "{\"from\":50000,"), Accumulated::Pending));
        assert!(matches!(accumulate(&mut pending, "\"port\":6000,\"ip\":\"10.0.0.1\","), Accumulated::Pending));
        match accumulate(&mut pending, "\"mac\":\"02:00:00:00:00:01\"}") {
            Accumulated::Command(cmd) => assert_eq!(cmd.port, 6000),
            _ => panic!("expected a parsed command"),
        }
    }

    #[test]
    fn blank_line_flushes_an_unparsable_record() {
        let mut pending = String::new();
        assert!(matches!(accumulate(&mut pending, "not json at all"), Accumulated::Pending));
        match accumulate(&mut pending, "") {
            Accumulated::Dropped(record) => assert_eq!(record, "not json at all"),
            _ => panic!("expected the record to be dropped"),
        }
        assert!(pending.is_empty());
    }

    #[test]
    fn close_command_round_trips_through_accumulate() {
        let mut pending = String::new();
        let line = r#"{"from":50010,"port":-1,"ip":"0.0.0.0","mac":"00:00:00:00:00:00"}"#;
        match accumulate(&mut pending, line) {
            Accumulated::Command(cmd) => assert!(cmd.to_endpoint().unwrap().is_closed()),
            _ => panic!("expected a parsed command"),
        }
    }
}
