// src/registry.rs

//! The Entry Registry (§4.C): owns `MasterSlaveEntry` objects, ref-counts
//! them across the slots routed to them, and drives their creation and
//! teardown against the `ConnectionPool` capability.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{info, warn};

use crate::config::{ClusterTopologyConfig, ReadMode};
use crate::error::{ClusterError, Result};
use crate::model::{ClusterPartition, NodeAddress, NodeId};
use crate::nat::NatMapper;
use crate::pool::{ClientId, ConnectionPool};
use crate::subscribe::SubscribeService;

/// Constructs the (unconnected) `ConnectionPool` object for a newly
/// discovered master. Actually dialing the master happens afterward, via
/// `ConnectionPool::setup_master`.
#[async_trait]
pub trait PoolFactory: Send + Sync {
    async fn create(&self, read_mode: ReadMode) -> anyhow::Result<Arc<dyn ConnectionPool>>;
}

/// One live master partition's runtime state: its connection pool plus the
/// slot refcount that governs its lifetime.
pub struct Entry {
    pub node_id: NodeId,
    pub pool: Arc<dyn ConnectionPool>,
    master_address: RwLock<NodeAddress>,
    refcount: AtomicUsize,
    shutting_down: AtomicBool,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("node_id", &self.node_id)
            .field("master_address", &self.master_address.read())
            .field("refcount", &self.refcount.load(Ordering::Relaxed))
            .finish()
    }
}

impl Entry {
    fn new(node_id: NodeId, pool: Arc<dyn ConnectionPool>, master_address: NodeAddress) -> Self {
        Self {
            node_id,
            pool,
            master_address: RwLock::new(master_address),
            refcount: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn master_address(&self) -> NodeAddress {
        self.master_address.read().clone()
    }

    pub fn set_master_address(&self, addr: NodeAddress) {
        *self.master_address.write() = addr;
    }

    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn client_id(&self) -> ClientId {
        self.pool.master_client_id()
    }

    /// Invoked precisely when a new slot begins routing to this entry.
    pub(crate) fn inc_ref(&self) -> usize {
        self.refcount.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Invoked precisely when a slot stops routing to this entry. Returns
    /// the refcount after the decrement.
    pub(crate) fn dec_ref(&self) -> usize {
        self.refcount.fetch_sub(1, Ordering::AcqRel) - 1
    }
}

/// Owns every live `Entry` plus the indexes needed for reverse lookup by
/// client handle and by master address.
pub struct Registry {
    entries: DashMap<NodeId, Arc<Entry>>,
    client_to_entry: DashMap<ClientId, Arc<Entry>>,
    address_to_entry: DashMap<NodeAddress, Arc<Entry>>,
    pool_factory: Arc<dyn PoolFactory>,
    nat: Arc<dyn NatMapper>,
    subscribe: Arc<dyn SubscribeService>,
    config: Arc<ClusterTopologyConfig>,
}

impl Registry {
    pub fn new(
        pool_factory: Arc<dyn PoolFactory>,
        nat: Arc<dyn NatMapper>,
        subscribe: Arc<dyn SubscribeService>,
        config: Arc<ClusterTopologyConfig>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            client_to_entry: DashMap::new(),
            address_to_entry: DashMap::new(),
            pool_factory,
            nat,
            subscribe,
            config,
        }
    }

    pub fn get(&self, node_id: &str) -> Option<Arc<Entry>> {
        self.entries.get(node_id).map(|e| e.clone())
    }

    pub fn entry_for_uri(&self, addr: &NodeAddress) -> Option<Arc<Entry>> {
        self.address_to_entry.get(addr).map(|e| e.clone())
    }

    pub fn entry_for_client(&self, client: ClientId) -> Option<Arc<Entry>> {
        if let Some(e) = self.client_to_entry.get(&client) {
            return Some(e.clone());
        }
        // Fallback: linear scan of registered entries checking slave
        // ownership, for requests routed through a slave connection.
        self.entries
            .iter()
            .find(|e| e.pool.owns_client(client))
            .map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Creates (or refuses to create) the entry for one master partition
    /// (§4.C). Does not touch the Router — callers install it into every
    /// slot the partition owns afterward.
    pub async fn add_master_entry(
        &self,
        partition: &ClusterPartition,
        sni: Option<&str>,
    ) -> Result<Arc<Entry>> {
        if partition.master_fail {
            return Err(ClusterError::Topology(format!(
                "refusing to add entry for already-failed master {}",
                partition.node_id
            )));
        }
        let master_addr = partition.master_address.clone().ok_or_else(|| {
            ClusterError::Topology(format!("master {} has no address", partition.node_id))
        })?;
        let mapped_addr = self.nat.map(&master_addr);

        let pool = self
            .pool_factory
            .create(self.config.read_mode)
            .await
            .map_err(|e| ClusterError::Connect {
                addr: mapped_addr.to_string(),
                reason: e.to_string(),
            })?;

        pool.setup_master(&mapped_addr, sni)
            .await
            .map_err(|e| ClusterError::Connect {
                addr: mapped_addr.to_string(),
                reason: e.to_string(),
            })?;

        let entry = Arc::new(Entry::new(partition.node_id.clone(), pool.clone(), mapped_addr.clone()));

        if !self.config.check_skip_slaves_init {
            if let Err(e) = pool
                .init_slave_balancer(&partition.failed_slave_addresses, sni)
                .await
            {
                warn!(node_id = %partition.node_id, error = %e, "slave balancer init failed; master entry is still usable");
            } else {
                let readonly = !matches!(self.config.read_mode, ReadMode::Master);
                for slave in &partition.slave_addresses {
                    let mapped_slave = self.nat.map(slave);
                    if let Err(e) = pool.add_slave(&mapped_slave, readonly, sni).await {
                        warn!(slave = %mapped_slave, error = %e, "failed to add slave during entry creation");
                    }
                }
            }
        }

        self.entries.insert(entry.node_id.clone(), entry.clone());
        self.client_to_entry.insert(entry.client_id(), entry.clone());
        self.address_to_entry.insert(mapped_addr, entry.clone());
        info!(node_id = %entry.node_id, address = %entry.master_address(), "master entry created");
        Ok(entry)
    }

    /// Repoints an existing entry's master connection, used during failover.
    /// `master_address` is committed only on success; callers are
    /// responsible for reverting their own bookkeeping on failure.
    pub async fn change_master(&self, entry: &Arc<Entry>, new_addr: &NodeAddress, sni: Option<&str>) -> anyhow::Result<()> {
        let mapped = self.nat.map(new_addr);
        entry.pool.setup_master(&mapped, sni).await?;
        let old_addr = entry.master_address();
        entry.set_master_address(mapped.clone());
        self.address_to_entry.remove(&old_addr);
        self.address_to_entry.insert(mapped, entry.clone());
        Ok(())
    }

    /// The Router's `install`/`evict` call this when a cell's previous
    /// occupant changes. Decrements the entry's refcount and, if it reaches
    /// zero, tears the entry down exactly once.
    pub async fn release(&self, entry: &Arc<Entry>) {
        let remaining = entry.dec_ref();
        if remaining > 0 {
            return;
        }
        if entry
            .shutting_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.entries.remove(&entry.node_id);
        self.client_to_entry.remove(&entry.client_id());
        self.address_to_entry.remove(&entry.master_address());

        for member in entry.pool.all_members() {
            entry.pool.node_down(&member).await;
        }
        entry.pool.master_down().await;
        self.subscribe.remove(entry.client_id()).await;
        entry.pool.shutdown_async().await;
        info!(node_id = %entry.node_id, "entry refcount reached zero; pool shut down");
    }

    /// Forcibly tears every entry down regardless of refcount, used only
    /// during manager shutdown (§4.G).
    pub async fn shutdown_all(&self) {
        let entries: Vec<Arc<Entry>> = self.entries.iter().map(|e| e.clone()).collect();
        for entry in entries {
            if entry
                .shutting_down
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.entries.remove(&entry.node_id);
                self.client_to_entry.remove(&entry.client_id());
                self.address_to_entry.remove(&entry.master_address());
                for member in entry.pool.all_members() {
                    entry.pool.node_down(&member).await;
                }
                entry.pool.master_down().await;
                self.subscribe.remove(entry.client_id()).await;
                entry.pool.shutdown_async().await;
            }
        }
    }
}
