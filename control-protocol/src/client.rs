//! Client-side helpers for sending route commands over a control
//! connection. Used by the `driver` and `tester` binaries.

use std::io::Write;

use crate::error::FrameError;
use crate::frame::{write_message, write_shutdown};
use crate::message::RouteCommand;

pub fn send_route<W: Write>(w: &mut W, cmd: &RouteCommand) -> Result<(), FrameError> {
    let body = cmd.to_json()?;
    write_message(w, &body)?;
    Ok(())
}

pub fn send_shutdown<W: Write>(w: &mut W) -> Result<(), FrameError> {
    write_shutdown(w)?;
    Ok(())
}
