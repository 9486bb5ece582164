use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("peer closed the connection")]
    ConnectionClosed,

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("frame length {0} exceeds the maximum allowed size")]
    TooLarge(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed route JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed IP address string: {0}")]
    BadIp(String),

    #[error("malformed MAC address string: {0}")]
    BadMac(String),
}
