//! Resolver orchestration.
//!
//! Wires the record store, upstream and UDP transport together and runs
//! the server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::cache::RecordStore;
use crate::error::Result;
use crate::resolver::Resolver;
use crate::transport::{UdpTransport, UdpUpstream, Upstream};

/// Configuration for the caching resolver.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Local address to bind (e.g., 127.0.0.1:8053)
    pub bind_addr: SocketAddr,
    /// Upstream DNS server that cache misses are forwarded to
    pub upstream: SocketAddr,
    /// How long to wait for the upstream before giving up on a query
    pub upstream_timeout: Duration,
    /// Maximum number of datagrams handled concurrently
    pub max_in_flight: usize,
    /// Maximum number of cached records; unbounded when `None`
    pub cache_capacity: Option<usize>,
    /// Answer SERVFAIL instead of dropping when the upstream fails
    pub servfail_on_upstream_error: bool,
    /// How often to log activity counters; never when `None`
    pub stats_interval: Option<Duration>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8053)),
            upstream: SocketAddr::from(([8, 8, 8, 8], 53)),
            upstream_timeout: Duration::from_secs(2),
            max_in_flight: 256,
            cache_capacity: None,
            servfail_on_upstream_error: false,
            stats_interval: Some(Duration::from_secs(60)),
        }
    }
}

/// Run the caching resolver with the given configuration.
///
/// Binds the UDP socket and forwards every cache miss to the configured
/// upstream. Runs until the receive loop stops.
pub async fn run(config: ProxyConfig) -> Result<()> {
    let store = Arc::new(match config.cache_capacity {
        Some(capacity) => RecordStore::with_capacity(capacity),
        None => RecordStore::new(),
    });
    let upstream = UdpUpstream::new(config.upstream, config.upstream_timeout);
    let resolver = Arc::new(
        Resolver::new(store, upstream)
            .with_servfail_on_upstream_error(config.servfail_on_upstream_error),
    );

    let udp = UdpTransport::bind(config.bind_addr).await?;
    info!(
        listen = %udp.local_addr()?,
        upstream = %config.upstream,
        timeout_ms = config.upstream_timeout.as_millis() as u64,
        max_in_flight = config.max_in_flight,
        "DNS resolver listening"
    );

    if let Some(period) = config.stats_interval.filter(|p| !p.is_zero()) {
        spawn_stats_reporter(resolver.clone(), period);
    }

    let handle = udp.start(resolver, config.max_in_flight);
    if let Err(err) = handle.await {
        error!(%err, "UDP transport stopped");
    }

    Ok(())
}

/// Log activity counters and sweep expired records every `period`.
fn spawn_stats_reporter<U: Upstream>(resolver: Arc<Resolver<U>>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let stats = resolver.stats_snapshot_and_reset();
            let purged = resolver.store().purge_expired(Instant::now());
            info!(
                uptime_secs = stats.uptime_secs,
                cache = resolver.cache_len(),
                purged,
                requests = stats.requests,
                cached = stats.cached,
                forwarded = stats.forwarded,
                dropped = stats.dropped,
                upstream_failures = stats.upstream_failures,
                avg_response_ms = %format!("{:.2}", stats.avg_response_ms),
                "stats"
            );
        }
    });
}
