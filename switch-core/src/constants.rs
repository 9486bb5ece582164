//! Normative constants from the switch's wire and addressing scheme.

/// Number of logical forwarding channels: 30 groups x 8 sockets x 16 channels.
pub const R30_TOTAL_CHANNELS: usize = 30 * 8 * 16;

/// Size of the route table; every `poa` maps to exactly one slot in `[0, N)`.
pub const N: usize = R30_TOTAL_CHANNELS;

/// First UDP port in the switch's data-plane range.
pub const PORT_OFFSET: i32 = 50_000;

/// TCP port of the control channel; one past the last data-plane port.
pub const CONTROL_PORT: u16 = 53_840; // PORT_OFFSET + N

/// Upper bound on how many CPUs a single process will pin workers to.
pub const MAX_CPU_COUNT: usize = 64;

/// Minimum worker thread stack size (matches the original pthread contract).
pub const WORKER_STACK_SIZE: usize = 128 * 1024;

/// The two historically valid forwarding interface names.
pub const PRODUCTION_INTERFACE: &str = "xgbe/0";
pub const CONVENIENCE_INTERFACE: &str = "gbe/0";

/// Ethernet header length in bytes (no 802.1Q tag support).
pub const ETH_HDR_LEN: usize = 14;

/// Minimum bytes an IPv4+UDP header pair must occupy to be well-formed.
pub const MIN_IPV4_UDP_LEN: usize = 28;
