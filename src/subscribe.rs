// src/subscribe.rs

//! The pub/sub reattachment collaborator, treated by contract only (§1, §6).

use async_trait::async_trait;

use crate::pool::ClientId;

/// Notified when entries are torn down or when slots change ownership, so
/// that subscriptions bound to those slots can be reattached to their new
/// owning connection.
#[async_trait]
pub trait SubscribeService: Send + Sync {
    /// Deregisters any subscriptions held against `client`'s pool; called
    /// when an entry's refcount reaches zero.
    async fn remove(&self, client: ClientId);

    /// Reattaches pub/sub subscriptions bound to `slot` to its new owner.
    /// Called once per migrated slot after a tick's slot-migration pass.
    async fn reattach_pubsub(&self, slot: u16);
}

/// A no-op implementation for callers that don't use cluster-aware pub/sub.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSubscribeService;

#[async_trait]
impl SubscribeService for NoopSubscribeService {
    async fn remove(&self, _client: ClientId) {}
    async fn reattach_pubsub(&self, _slot: u16) {}
}
