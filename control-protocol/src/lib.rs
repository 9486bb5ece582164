//! Framed TCP control protocol (C6): a 4-byte little-endian length
//! prefix, a JSON route command body, and a zero-length shutdown
//! sentinel.

pub mod client;
pub mod error;
pub mod frame;
pub mod message;
pub mod server;

pub use error::FrameError;
pub use frame::{Frame, read_frame, write_message, write_shutdown};
pub use message::RouteCommand;
