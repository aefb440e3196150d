//! Client configuration, read from a TOML file.

use crate::pool::{PoolLimits, TcpDialer};
use crate::protocol::defaults;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Tracker host names or addresses
    pub tracker_hosts: Vec<String>,

    #[serde(default = "default_tracker_port")]
    pub tracker_port: u16,

    /// Tracker connections dialed at startup
    #[serde(default = "default_min_conns")]
    pub min_conns: usize,

    /// Idle connections kept per pool
    #[serde(default = "default_max_conns")]
    pub max_conns: usize,

    pub connect_timeout_ms: Option<u64>,

    /// Socket read/write timeout
    pub network_timeout_ms: Option<u64>,

    /// Append client events to this file
    pub log_file: Option<PathBuf>,
}

fn default_tracker_port() -> u16 {
    defaults::TRACKER_PORT
}

fn default_min_conns() -> usize {
    defaults::MIN_CONNS
}

fn default_max_conns() -> usize {
    defaults::MAX_CONNS
}

impl ClientConfig {
    pub fn new(tracker_hosts: Vec<String>) -> Self {
        ClientConfig {
            tracker_hosts,
            tracker_port: defaults::TRACKER_PORT,
            min_conns: defaults::MIN_CONNS,
            max_conns: defaults::MAX_CONNS,
            connect_timeout_ms: None,
            network_timeout_ms: None,
            log_file: None,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ClientConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tracker_hosts.is_empty() {
            bail!("tracker_hosts must not be empty");
        }
        if self.tracker_hosts.iter().any(|h| h.trim().is_empty()) {
            bail!("tracker_hosts contains an empty entry");
        }
        if self.tracker_port == 0 {
            bail!("tracker_port must be nonzero");
        }
        self.limits().validate()?;
        Ok(())
    }

    pub fn limits(&self) -> PoolLimits {
        PoolLimits {
            min_conns: self.min_conns,
            max_conns: self.max_conns,
        }
    }

    pub fn dialer(&self) -> TcpDialer {
        TcpDialer {
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            io_timeout: self.network_timeout_ms.map(Duration::from_millis),
        }
    }
}
