//! Core packet-plane, route table, and concurrency primitives shared by
//! the `switch`, `tester`, and `driver` binaries.

pub mod constants;
pub mod counters;
pub mod error;
pub mod model;
pub mod monitor;
pub mod netinfo;
pub mod nic;
pub mod packet;
pub mod route_table;
pub mod tap;
pub mod worker;

pub use error::SwitchError;
pub use model::{Endpoint, PacketStatus, Route, WorkerCounters};
pub use route_table::RouteTable;
