use thiserror::Error;

/// Library-level errors surfaced from the packet plane and NIC binding.
///
/// Both variants cross a binary's `main` as a hard, process-fatal
/// failure; every other condition in §7's error-handling table (a bad
/// port of arrival included) is logged and absorbed in place rather than
/// propagated through this type -- see `worker/forward.rs`'s
/// `debug_assert!` + log on an unmapped poa.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("NIC driver error: {0}")]
    Nic(String),

    #[error("TAP device I/O error: {0}")]
    Tap(#[from] std::io::Error),
}
