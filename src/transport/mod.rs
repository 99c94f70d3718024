//! Transport layer.
//!
//! The client-facing UDP listener lives in [`udp`]; the upstream side is
//! abstracted behind [`Upstream`] so the resolver can be driven by any
//! datagram exchange, real or mocked.

pub mod udp;
pub mod upstream;

pub use udp::UdpTransport;
pub use upstream::UdpUpstream;

use std::future::Future;

use crate::error::Result;

/// Maximum size of a DNS packet (with some headroom).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

/// A datagram round-trip to the upstream resolver.
///
/// Implementations send `query` unchanged and return the raw reply that
/// answers it. Timeouts and unreachable upstreams surface as
/// [`Error::UpstreamTimeout`](crate::Error::UpstreamTimeout) and
/// [`Error::UpstreamUnreachable`](crate::Error::UpstreamUnreachable).
pub trait Upstream: Send + Sync + 'static {
    fn exchange(&self, query: &[u8]) -> impl Future<Output = Result<Vec<u8>>> + Send;
}
