// src/config.rs

//! Configuration recognized by the cluster topology manager.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How reads should be routed relative to a partition's master and slaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadMode {
    Master,
    Slave,
    MasterSlave,
}

impl Default for ReadMode {
    fn default() -> Self {
        ReadMode::Master
    }
}

/// Configuration for the cluster topology manager. Does not itself parse a config
/// file — callers embed this in their own configuration tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterTopologyConfig {
    /// Static seed addresses used for bootstrap, tried in order.
    pub node_addresses: Vec<String>,

    /// Period of the topology monitor's reconciliation tick.
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// When true, bootstrap fails if fewer than 16384 slots end up covered.
    #[serde(default)]
    pub check_slots_coverage: bool,

    #[serde(default)]
    pub read_mode: ReadMode,

    /// When true, `add_master_entry` skips `init_slave_balancer` entirely.
    #[serde(default)]
    pub check_skip_slaves_init: bool,

    /// Whether control connections negotiate TLS.
    #[serde(default)]
    pub tls_enabled: bool,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl ClusterTopologyConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

fn default_scan_interval_ms() -> u64 {
    1000
}
fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_response_timeout_ms() -> u64 {
    2000
}

impl Default for ClusterTopologyConfig {
    fn default() -> Self {
        Self {
            node_addresses: Vec::new(),
            scan_interval_ms: default_scan_interval_ms(),
            check_slots_coverage: false,
            read_mode: ReadMode::default(),
            check_skip_slaves_init: false,
            tls_enabled: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}
