//! Server side of the control channel (C6): accepts one connection at a
//! time and applies parsed route commands to a [`RouteTable`].

use std::io::{Read, Write};

use switch_core::RouteTable;

use crate::frame::{Frame, read_frame};
use crate::message::RouteCommand;

/// Drives one accepted connection to completion, applying every parsed
/// `RouteCommand` to `routes`. A malformed frame is logged and skipped;
/// the connection keeps going. Returns the number of commands applied.
///
/// The caller owns accept/listen; this only ever sees one stream at a
/// time, matching the "single consumer" requirement.
pub fn serve_connection<S: Read + Write>(stream: &mut S, routes: &RouteTable) -> usize {
    let mut applied = 0;
    loop {
        match read_frame(stream) {
            Ok(Frame::Shutdown) => {
                tracing::info!("control connection sent shutdown sentinel");
                break;
            }
            Ok(Frame::Message(body)) => match RouteCommand::from_json(&body) {
                Ok(cmd) => {
                    if apply(&cmd, routes) {
                        applied += 1;
                    } else {
                        tracing::error!(from = cmd.from, "route command out of range, dropped");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "malformed route command, dropped");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "control connection closed");
                break;
            }
        }
    }
    applied
}

fn apply(cmd: &RouteCommand, routes: &RouteTable) -> bool {
    if cmd.port < 0 {
        return routes.close(cmd.from);
    }
    match cmd.to_endpoint() {
        Ok(dst) => routes.open(cmd.from, dst),
        Err(e) => {
            tracing::error!(error = %e, "route command had an unparsable destination");
            false
        }
    }
}
