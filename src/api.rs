//! Hytale Status
//!
//! Hytale Status queries a Hytale game server over QUIC and reports whether it is
//! online, its player counts, MOTD, version and round-trip latency.
//!
//! ## Features
//! - Binary codec: little-endian integers, 5-byte varints and length-prefixed strings.
//! - Packet model: the client Connect handshake and the server Status response.
//! - QUIC transport: TLS 1.3 with the `hytale/1` ALPN, one request and one response stream.
//! - One-shot query: every failure becomes an offline result, each attempt is bounded by a timeout.
//! - Result cache: recent results are served without dialing the server again.

/// Cache of recent query results
pub mod cache;
/// Configuration Module
pub mod config;
/// Hytale Status Exceptions Module
pub mod exceptions;
/// Module for logging and registration of events
pub mod logger;
/// Realization of network working on more low transport level
pub mod network;
/// Wire format: codec, constants and packets
pub mod protocol;
/// One status query attempt from dial to decode
pub mod query;

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::cache::StatusCache;
use crate::config::Config;
use crate::exceptions::{Result, StatusError};
use crate::network::transport::{Connector, QuicConnector};
use crate::protocol::packets::ServerStatus;
use crate::query::StatusQuery;

/// Splits `"host"`, `"host:port"` or `"[v6]:port"` into host and port
///
/// A bare IPv6 address without brackets takes the default port.
pub fn parse_address(address: &str, default_port: u16) -> Result<(String, u16)> {
    let invalid = || StatusError::InvalidAddress(address.to_string());
    let address_trim = address.trim();

    let (host, port) = if let Some(rest) = address_trim.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        match tail {
            "" => (host, None),
            _ => (host, Some(tail.strip_prefix(':').ok_or_else(invalid)?)),
        }
    } else {
        match address_trim.split_once(':') {
            Some((host, port)) if !port.contains(':') => (host, Some(port)),
            Some(_) => (address_trim, None),
            None => (address_trim, None),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }

    let port = match port {
        Some(port) => match port.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => return Err(invalid()),
        },
        None => default_port,
    };

    Ok((host.to_string(), port))
}

/// API client: cache lookup, then one bounded query, then cache store
pub struct StatusClient {
    config: Config,
    query: StatusQuery,
    cache: Arc<StatusCache>,
    permits: Arc<Semaphore>,
}

impl StatusClient {
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, Arc::new(QuicConnector::new()))
    }

    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Self {
        let query = StatusQuery::new(connector, config.hytale.timeout, &config.hytale.user_agent)
            .with_max_packet_size(config.hytale.max_packet_size);
        let cache = Arc::new(StatusCache::new(
            config.cache.ttl,
            config.cache.max_entries,
        ));
        let permits = Arc::new(Semaphore::new(config.hytale.max_connections.max(1)));

        Self {
            config,
            query,
            cache,
            permits,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    /// Starts the periodic cache sweep
    pub async fn start(&self) {
        self.cache
            .start_cleanup(self.config.cache.cleanup_interval)
            .await;
    }

    /// Stops the periodic cache sweep
    pub async fn shutdown(&self) {
        self.cache.stop_cleanup().await;
    }

    /// Returns the status of `address`, served from the cache when fresh
    ///
    /// # Errors
    ///
    /// Fails only when `address` cannot be parsed. An unreachable or broken
    /// server yields an offline [`ServerStatus`], which is cached as well.
    pub async fn query(&self, address: &str) -> Result<Arc<ServerStatus>> {
        let (host, port) = parse_address(address, self.config.hytale.default_port)?;
        let key = format!("{}:{}", host, port);

        if let Some(status) = self.cache.get(&key).await {
            debug!(address = %key, "Status served from cache");
            return Ok(status);
        }

        let status = {
            // the semaphore is never closed, a missing permit only loses the bound
            let _permit = self.permits.acquire().await.ok();
            self.query.run(&host, port).await
        };

        Ok(self.cache.set(&key, status).await)
    }
}
