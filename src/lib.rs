//! fdfs client library
//!
//! Pooled blocking client for a tracker/storage distributed file system:
//! binary wire protocol, storage lookups, uploads (plain and slave) and downloads.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod logger;
pub mod net;
pub mod pool;
pub mod protocol;
pub mod protocol_core;
pub mod storage;
pub mod tracker;

pub use client::FdfsClient;
pub use codec::{DownloadContent, DownloadFileResponse, StorageServer, UploadFileResponse};
pub use config::ClientConfig;
pub use error::{FdfsError, Result};
pub use pool::{ConnectionPool, Dialer, HostSelector, PoolLimits, TcpDialer};
