//! Wire framing for the control channel: a 4-byte little-endian length
//! prefix followed by a JSON body. A length of zero carries no body and
//! is the shutdown sentinel.
//!
//! The original protocol read the length prefix in host byte order and
//! assumed a single `read()` call returned the whole frame. Neither
//! assumption holds across a TCP stream: this module fixes both by
//! fixing the prefix's endianness and by looping until every requested
//! byte has actually arrived (or the peer goes away).

use std::io::{self, Read, Write};

use crate::error::FrameError;

/// Frames larger than this are rejected outright rather than causing an
/// unbounded allocation from a corrupt or hostile length prefix.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A zero-length frame: the peer is telling us to stop.
    Shutdown,
    /// A non-empty frame's raw body, not yet parsed as JSON.
    Message(Vec<u8>),
}

fn read_fully<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize, FrameError> {
    let mut got = 0;
    while got < buf.len() {
        match r.read(&mut buf[got..]) {
            Ok(0) => return Ok(got),
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
    Ok(got)
}

/// Reads one frame from `r`. Returns `ConnectionClosed` only when the
/// peer closes before sending any byte of a new frame; an EOF in the
/// middle of a frame is a `ShortRead`, distinct from a clean shutdown.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Frame, FrameError> {
    let mut len_buf = [0u8; 4];
    let got = read_fully(r, &mut len_buf)?;
    if got == 0 {
        return Err(FrameError::ConnectionClosed);
    }
    if got < 4 {
        return Err(FrameError::ShortRead { expected: 4, got });
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len == 0 {
        return Ok(Frame::Shutdown);
    }
    if len > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge(len));
    }

    let mut body = vec![0u8; len];
    let got = read_fully(r, &mut body)?;
    if got < len {
        return Err(FrameError::ShortRead { expected: len, got });
    }
    Ok(Frame::Message(body))
}

pub fn write_message<W: Write>(w: &mut W, body: &[u8]) -> io::Result<()> {
    debug_assert!(!body.is_empty(), "empty body is reserved for the shutdown sentinel");
    let len = body.len() as u32;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(body)?;
    w.flush()
}

pub fn write_shutdown<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_all(&0u32.to_le_bytes())?;
    w.flush()
}
