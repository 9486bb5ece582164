pub mod forward;
pub mod tap_bridge;
