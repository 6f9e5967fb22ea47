// src/error.rs

//! The error type for the cluster topology manager.

use thiserror::Error;

/// Errors raised by the cluster topology manager.
///
/// Only `Fatal` is ever surfaced to the caller of `ClusterTopologyManager::bootstrap`;
/// every other kind is either retried against the next candidate or logged and
/// absorbed by the topology monitor, per the propagation rules in the error handling
/// design.
#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    #[error("failed to open control connection to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("malformed or empty CLUSTER NODES response from {addr}: {reason}")]
    Protocol { addr: String, reason: String },

    #[error("DNS resolution failed for node {node_id} ({host}): {reason}")]
    Resolve {
        node_id: String,
        host: String,
        reason: String,
    },

    #[error("topology error: {0}")]
    Topology(String),

    #[error("slot coverage incomplete: {covered}/{total} slots mapped")]
    Coverage { covered: usize, total: usize },

    #[error("cluster bootstrap failed: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
