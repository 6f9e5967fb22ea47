// src/pool.rs

//! The `ConnectionPool` capability: the per-node, per-master connection pool
//! this manager treats as an opaque collaborator (§1 Out of scope). Command
//! encoding, multiplexing, and actual TCP I/O for data-plane traffic live on
//! the other side of this trait; the topology manager only ever calls the
//! narrow lifecycle surface below.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;

use crate::model::NodeAddress;

/// Opaque handle identifying a pool's master client connection. Stable for the
/// lifetime of the pool; used as the key of `client_to_entry` for ASK/MOVED
/// reverse lookups.
pub type ClientId = u64;

/// Sentinel distinguishing an up/down transition this manager initiated from
/// one driven by some other collaborator (e.g. a health-check loop inside the
/// pool itself). Only `Manager` is ever passed by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FreezeReason {
    Manager,
}

/// The capability surface exposed by a per-master connection pool.
///
/// Implementations multiplex application commands over TCP to the master and
/// its slaves; none of that is this manager's concern. What the manager needs
/// is the ability to point the pool at a master, grow/shrink its slave set,
/// freeze/unfreeze members during topology churn, and tear it all down.
#[async_trait]
pub trait ConnectionPool: Send + Sync + fmt::Debug {
    /// Points (or re-points, during failover) the pool's master connection at
    /// `addr`. `sni` is the TLS server name to present, when applicable.
    async fn setup_master(&self, addr: &NodeAddress, sni: Option<&str>) -> anyhow::Result<()>;

    /// Initializes the slave-read balancer, skipping addresses already known
    /// to be failed.
    async fn init_slave_balancer(
        &self,
        failed: &BTreeSet<NodeAddress>,
        sni: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Adds one slave connection to the balancer.
    async fn add_slave(&self, addr: &NodeAddress, readonly: bool, sni: Option<&str>) -> anyhow::Result<()>;

    /// Whether the pool already has a connection object for `addr`.
    fn has_slave(&self, addr: &NodeAddress) -> bool;

    /// Marks a previously-failed slave usable again.
    async fn slave_up(&self, addr: &NodeAddress, reason: FreezeReason);

    /// Freezes a slave so it is no longer selected for reads.
    async fn slave_down(&self, addr: &NodeAddress, reason: FreezeReason);

    /// Marks the master connection itself unusable (entry is being torn down).
    async fn master_down(&self);

    /// Disconnects and forgets a single member address (master or slave).
    async fn node_down(&self, addr: &NodeAddress);

    /// Gracefully shuts the whole pool down. Idempotent from the caller's
    /// perspective: the registry guarantees this is invoked at most once per
    /// entry, but implementations should tolerate repeat calls regardless.
    async fn shutdown_async(&self);

    /// The stable identifier of this pool's master client connection.
    fn master_client_id(&self) -> ClientId;

    /// Whether `client` identifies a connection object (master or slave)
    /// owned by this pool. Backs the `entry_for_client` fallback scan.
    fn owns_client(&self, client: ClientId) -> bool;

    /// All currently known member addresses (master + slaves), used when
    /// tearing an entry down to call `node_down` on each.
    fn all_members(&self) -> Vec<NodeAddress>;
}
