// src/control.rs

//! A narrow internal client used only to issue `CLUSTER NODES` against a
//! candidate node and read back its reply. Mirrors the connect/send/receive
//! shape of the teacher's internal clients, trimmed to this crate's single
//! command.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ClusterError, Result};
use crate::model::{NodeAddress, RawNodeInfo};
use crate::parser::parse_cluster_nodes_text;
use crate::wire::{RespFrameCodec, cluster_nodes_command, extract_cluster_nodes_text};

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// A single control connection to one cluster node.
pub struct ControlConnection {
    stream: Box<dyn AsyncStream>,
    codec: RespFrameCodec,
    addr: NodeAddress,
    response_timeout: Duration,
}

impl ControlConnection {
    /// Opens a connection to `addr`, negotiating TLS when `tls_config` is
    /// supplied. `connect_timeout` bounds the whole handshake.
    pub async fn connect(
        addr: &NodeAddress,
        tls_config: Option<(&Arc<rustls::ClientConfig>, &str)>,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Result<Self> {
        let socket_addr: SocketAddr = format!("{}:{}", addr.host, addr.port)
            .parse()
            .map_err(|e| ClusterError::Connect {
                addr: addr.to_string(),
                reason: format!("invalid socket address: {e}"),
            })?;

        let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| ClusterError::Connect {
                addr: addr.to_string(),
                reason: "connect timed out".into(),
            })?
            .map_err(|e| ClusterError::Connect {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let _ = tcp.set_nodelay(true);

        let stream: Box<dyn AsyncStream> = match tls_config {
            Some((config, sni)) => {
                let connector = tokio_rustls::TlsConnector::from(config.clone());
                let server_name =
                    rustls::pki_types::ServerName::try_from(sni.to_string()).map_err(|e| {
                        ClusterError::Connect {
                            addr: addr.to_string(),
                            reason: format!("invalid TLS server name {sni:?}: {e}"),
                        }
                    })?;
                let tls_stream = tokio::time::timeout(connect_timeout, connector.connect(server_name, tcp))
                    .await
                    .map_err(|_| ClusterError::Connect {
                        addr: addr.to_string(),
                        reason: "TLS handshake timed out".into(),
                    })?
                    .map_err(|e| ClusterError::Connect {
                        addr: addr.to_string(),
                        reason: format!("TLS handshake failed: {e}"),
                    })?;
                Box::new(tls_stream)
            }
            None => Box::new(tcp),
        };

        Ok(Self {
            stream,
            codec: RespFrameCodec,
            addr: addr.clone(),
            response_timeout,
        })
    }

    /// Issues `CLUSTER NODES` and parses the reply into raw gossip records.
    pub async fn cluster_nodes(&mut self, tls: bool) -> Result<Vec<RawNodeInfo>> {
        let mut write_buf = BytesMut::new();
        self.codec
            .encode(cluster_nodes_command(tls), &mut write_buf)
            .map_err(|_| ClusterError::Protocol {
                addr: self.addr.to_string(),
                reason: "failed to encode CLUSTER NODES".into(),
            })?;

        tokio::time::timeout(self.response_timeout, self.stream.write_all(&write_buf))
            .await
            .map_err(|_| ClusterError::Connect {
                addr: self.addr.to_string(),
                reason: "write timed out".into(),
            })?
            .map_err(|e| ClusterError::Connect {
                addr: self.addr.to_string(),
                reason: e.to_string(),
            })?;

        let mut read_buf = BytesMut::with_capacity(16 * 1024);
        loop {
            if let Some(frame) = self.codec.decode(&mut read_buf)? {
                let text = extract_cluster_nodes_text(&self.addr.to_string(), frame)?;
                return Ok(parse_cluster_nodes_text(&text));
            }
            let read_fut = self.stream.read_buf(&mut read_buf);
            let n = tokio::time::timeout(self.response_timeout, read_fut)
                .await
                .map_err(|_| ClusterError::Connect {
                    addr: self.addr.to_string(),
                    reason: "read timed out".into(),
                })?
                .map_err(|e| ClusterError::Connect {
                    addr: self.addr.to_string(),
                    reason: e.to_string(),
                })?;
            if n == 0 {
                return Err(ClusterError::Connect {
                    addr: self.addr.to_string(),
                    reason: "connection closed by peer".into(),
                });
            }
        }
    }
}

/// Opens a control connection to `addr` and fetches one `CLUSTER NODES`
/// snapshot, in one call. `sni` is the TLS server name to present when `tls`
/// is enabled; bootstrap and the topology monitor share this helper rather
/// than duplicating the connect/request/parse sequence at each call site.
pub async fn fetch_cluster_nodes(
    addr: &NodeAddress,
    tls: bool,
    sni: Option<&str>,
    connect_timeout: Duration,
    response_timeout: Duration,
) -> Result<Vec<RawNodeInfo>> {
    let tls_config = if tls { Some(default_tls_config()) } else { None };
    let tls_ref = tls_config.as_ref().zip(sni).map(|(cfg, sni)| (cfg, sni));
    let mut conn = ControlConnection::connect(addr, tls_ref, connect_timeout, response_timeout).await?;
    let raw_nodes = conn.cluster_nodes(tls).await?;
    if raw_nodes.is_empty() {
        return Err(ClusterError::Protocol {
            addr: addr.to_string(),
            reason: "empty CLUSTER NODES snapshot".into(),
        });
    }
    Ok(raw_nodes)
}

/// Builds a default TLS client config trusting the bundled webpki roots, for
/// callers that enable `tls_enabled` without supplying their own
/// `rustls::ClientConfig`.
pub fn default_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Arc::new(config)
}
