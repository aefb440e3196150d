//! Error kinds surfaced by the tracker and storage clients

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FdfsError {
    #[error("connection pool is closed")]
    PoolClosed,
    #[error("connect {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
    #[error("server returned status {status}")]
    Server { status: u8 },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("file {path}: {reason}")]
    File { path: PathBuf, reason: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl FdfsError {
    pub(crate) fn file(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        FdfsError::File {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FdfsError>;
