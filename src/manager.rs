// src/manager.rs

//! The public-facing `ClusterTopologyManager` (§6, §9): composes the Router,
//! Registry, and Monitor behind the small set of virtual-call points a
//! higher-level client needs — `calc_slot`, `entry_for_*`, `change_master`,
//! `shutdown`, `apply_nat_map`, `is_cluster_mode`, `last_cluster_node`.
//! Composition over inheritance, per the design notes: there is no base
//! connection manager to extend, just this struct and the collaborators it
//! owns.

use std::sync::Arc;
use tracing::info;

use crate::bootstrap::bootstrap;
use crate::config::ClusterTopologyConfig;
use crate::error::{ClusterError, Result};
use crate::model::NodeAddress;
use crate::monitor::TopologyMonitor;
use crate::nat::NatMapper;
use crate::pool::ClientId;
use crate::registry::{Entry, PoolFactory, Registry};
use crate::resolver::AddressResolver;
use crate::router::Router;
use crate::shutdown::ShutdownLatch;
use crate::slot::calc_slot;
use crate::subscribe::SubscribeService;

pub struct ClusterTopologyManager {
    router: Arc<Router>,
    registry: Arc<Registry>,
    nat: Arc<dyn NatMapper>,
    monitor: Arc<TopologyMonitor>,
    monitor_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown: Arc<ShutdownLatch>,
}

impl ClusterTopologyManager {
    /// Runs bootstrap against the configured seeds and, on success, spawns
    /// the topology monitor's tick loop. Fails exactly as §4.D describes:
    /// every seed unreachable, or a parsed snapshot producing no usable
    /// master, surfaces as `ClusterError::Fatal`; a strict coverage shortfall
    /// surfaces as `ClusterError::Coverage`.
    pub async fn start(
        config: ClusterTopologyConfig,
        pool_factory: Arc<dyn PoolFactory>,
        resolver: Arc<dyn AddressResolver>,
        nat: Arc<dyn NatMapper>,
        subscribe: Arc<dyn SubscribeService>,
    ) -> Result<Arc<Self>> {
        let config = Arc::new(config);
        let router = Arc::new(Router::new());
        let registry = Arc::new(Registry::new(pool_factory, nat.clone(), subscribe.clone(), config.clone()));
        let shutdown = Arc::new(ShutdownLatch::new());

        let outcome = bootstrap(&config, resolver.as_ref(), &router, &registry).await?;
        info!(
            last_cluster_node = %outcome.last_cluster_node,
            partitions = outcome.partitions.len(),
            "cluster topology manager bootstrapped"
        );

        let monitor = Arc::new(TopologyMonitor::new(
            outcome,
            router.clone(),
            registry.clone(),
            resolver,
            subscribe,
            config,
            shutdown.clone(),
        ));
        let handle = monitor.clone().spawn();

        Ok(Arc::new(Self {
            router,
            registry,
            nat,
            monitor,
            monitor_handle: tokio::sync::Mutex::new(Some(handle)),
            shutdown,
        }))
    }

    /// Hot-path slot lookup: a single atomic load.
    pub fn entry_for_slot(&self, slot: u16) -> Option<Arc<Entry>> {
        self.router.entry_for_slot(slot)
    }

    pub fn entry_for_uri(&self, addr: &NodeAddress) -> Option<Arc<Entry>> {
        self.registry.entry_for_uri(addr)
    }

    pub fn entry_for_client(&self, client: ClientId) -> Option<Arc<Entry>> {
        self.registry.entry_for_client(client)
    }

    pub fn calc_slot(&self, key: &[u8]) -> u16 {
        calc_slot(key)
    }

    pub fn apply_nat_map(&self, addr: &NodeAddress) -> NodeAddress {
        self.nat.map(addr)
    }

    pub fn last_cluster_node(&self) -> NodeAddress {
        self.monitor.last_cluster_node()
    }

    pub fn is_cluster_mode(&self) -> bool {
        true
    }

    /// Repoints the entry serving `slot` at `new_addr`, the same operation
    /// the monitor performs internally during a master failover, exposed for
    /// callers that need to force it (e.g. an administrative command).
    pub async fn change_master(&self, slot: u16, new_addr: &NodeAddress, sni: Option<&str>) -> Result<()> {
        let entry = self
            .router
            .entry_for_slot(slot)
            .ok_or_else(|| ClusterError::Topology(format!("no entry currently routes slot {slot}")))?;
        self.registry
            .change_master(&entry, new_addr, sni)
            .await
            .map_err(|e| ClusterError::Connect {
                addr: new_addr.to_string(),
                reason: e.to_string(),
            })
    }

    /// Stops the monitor, drains any tick in flight, and tears every entry
    /// down regardless of refcount.
    pub async fn shutdown(&self) {
        self.shutdown.begin_drain().await;
        if let Some(handle) = self.monitor_handle.lock().await.take() {
            handle.abort();
        }
        self.registry.shutdown_all().await;
        info!("cluster topology manager shut down");
    }
}
