// src/lib.rs

//! Cluster topology management for a sharded, replicated key/value store
//! client: discovers the cluster from a set of seed addresses, maintains a
//! lock-free slot→connection-pool routing table, and reconciles it against
//! the cluster's gossip state on a periodic tick.

pub mod bootstrap;
pub mod config;
pub mod control;
pub mod error;
pub mod manager;
pub mod model;
pub mod monitor;
pub mod nat;
pub mod parser;
pub mod pool;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod shutdown;
pub mod slot;
pub mod subscribe;
pub mod wire;

pub use config::{ClusterTopologyConfig, ReadMode};
pub use error::{ClusterError, Result};
pub use manager::ClusterTopologyManager;
pub use model::{ClusterPartition, NodeAddress, NodeFlags, NodeId, PartitionType, RawNodeInfo, SlotRange};
pub use nat::{IdentityNatMapper, NatMapper};
pub use pool::{ClientId, ConnectionPool, FreezeReason};
pub use registry::{Entry, PoolFactory, Registry};
pub use resolver::{AddressResolver, SystemResolver};
pub use router::Router;
pub use slot::{NUM_SLOTS, calc_slot};
pub use subscribe::{NoopSubscribeService, SubscribeService};
