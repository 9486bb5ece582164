pub mod build;
pub mod checksum;
pub mod parse;

pub use build::{FrameEndpoint, build_udp_frame};
pub use parse::{PacketInfo, parse_frame};
