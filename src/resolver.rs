// src/resolver.rs

//! DNS resolution, treated as a narrow external collaborator (§1, §6).

use async_trait::async_trait;
use std::net::SocketAddr;

/// Resolves a hostname to the sockets it currently maps to. A literal IP
/// host resolves to exactly one socket with that IP.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve_all(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>>;
}

/// The default resolver, backed by the system's resolver via Tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl AddressResolver for SystemResolver {
    async fn resolve_all(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.collect())
    }
}
