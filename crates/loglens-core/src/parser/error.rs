use thiserror::Error;

/// Per-line parse failures. Non-fatal: the file loop records a warning and
/// continues with the next line.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("line matches neither combined nor common format")]
    Format,
    #[error("invalid IP address: {value}")]
    InvalidIp { value: String },
    #[error("invalid timestamp: {value}")]
    InvalidTimestamp { value: String },
    #[error("invalid status code: {value}")]
    InvalidStatus { value: String },
    #[error("invalid response size: {value}")]
    InvalidSize { value: String },
}
