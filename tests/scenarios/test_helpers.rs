// tests/scenarios/test_helpers.rs

//! Shared test doubles for the cluster scenario tests: a `ConnectionPool` that
//! records the calls made against it instead of touching the network, and a
//! fixed-table `AddressResolver`. Built against the crate's public API only —
//! integration tests link as a separate crate and cannot see `src`'s
//! `#[cfg(test)] pub(crate)` mocks.

use async_trait::async_trait;
use cluster_topology::{ClientId, ConnectionPool, FreezeReason, NodeAddress, PoolFactory, ReadMode};
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
pub struct RecordedCalls {
    pub slave_up: Vec<NodeAddress>,
    pub slave_down: Vec<NodeAddress>,
    pub node_down: Vec<NodeAddress>,
    pub add_slave: Vec<NodeAddress>,
    pub setup_master: Vec<NodeAddress>,
    pub shutdown: usize,
}

#[derive(Debug)]
pub struct MockPool {
    pub client_id: ClientId,
    pub slaves: Mutex<BTreeSet<NodeAddress>>,
    pub master: Mutex<Option<NodeAddress>>,
    pub calls: Mutex<RecordedCalls>,
}

impl MockPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            client_id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            slaves: Mutex::new(BTreeSet::new()),
            master: Mutex::new(None),
            calls: Mutex::new(RecordedCalls::default()),
        })
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    async fn setup_master(&self, addr: &NodeAddress, _sni: Option<&str>) -> anyhow::Result<()> {
        *self.master.lock().await = Some(addr.clone());
        self.calls.lock().await.setup_master.push(addr.clone());
        Ok(())
    }

    async fn init_slave_balancer(&self, _failed: &BTreeSet<NodeAddress>, _sni: Option<&str>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn add_slave(&self, addr: &NodeAddress, _readonly: bool, _sni: Option<&str>) -> anyhow::Result<()> {
        self.slaves.lock().await.insert(addr.clone());
        self.calls.lock().await.add_slave.push(addr.clone());
        Ok(())
    }

    fn has_slave(&self, addr: &NodeAddress) -> bool {
        self.slaves.try_lock().map(|s| s.contains(addr)).unwrap_or(false)
    }

    async fn slave_up(&self, addr: &NodeAddress, _reason: FreezeReason) {
        self.calls.lock().await.slave_up.push(addr.clone());
    }

    async fn slave_down(&self, addr: &NodeAddress, _reason: FreezeReason) {
        self.calls.lock().await.slave_down.push(addr.clone());
    }

    async fn master_down(&self) {}

    async fn node_down(&self, addr: &NodeAddress) {
        self.calls.lock().await.node_down.push(addr.clone());
    }

    async fn shutdown_async(&self) {
        self.calls.lock().await.shutdown += 1;
    }

    fn master_client_id(&self) -> ClientId {
        self.client_id
    }

    fn owns_client(&self, client: ClientId) -> bool {
        client == self.client_id
    }

    fn all_members(&self) -> Vec<NodeAddress> {
        let mut members: Vec<NodeAddress> = self
            .slaves
            .try_lock()
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        if let Some(m) = self.master.try_lock().ok().and_then(|g| g.clone()) {
            members.push(m);
        }
        members
    }
}

#[derive(Debug, Default)]
pub struct MockPoolFactory {
    pub created: Mutex<Vec<Arc<MockPool>>>,
}

impl MockPoolFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl PoolFactory for MockPoolFactory {
    async fn create(&self, _read_mode: ReadMode) -> anyhow::Result<Arc<dyn ConnectionPool>> {
        let pool = MockPool::new();
        self.created.lock().await.push(pool.clone());
        Ok(pool as Arc<dyn ConnectionPool>)
    }
}

/// A fixed-table resolver: every address in these scenarios is already a
/// literal IP, so this mostly just parses it back out, with the ability to
/// simulate an unreachable seed by name.
#[derive(Debug, Default)]
pub struct StaticResolver {
    failing: std::collections::HashSet<String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, host: &str) -> Self {
        self.failing.insert(host.to_string());
        self
    }
}

#[async_trait]
impl cluster_topology::AddressResolver for StaticResolver {
    async fn resolve_all(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        if self.failing.contains(host) {
            return Err(std::io::Error::other(format!("simulated resolution failure for {host}")));
        }
        match host.parse::<IpAddr>() {
            Ok(ip) => Ok(vec![SocketAddr::new(ip, port)]),
            Err(_) => Err(std::io::Error::other(format!("unknown host {host}"))),
        }
    }
}
