//! UDP exchange with the upstream resolver.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::error::{Error, Result};

use super::{MAX_DNS_PACKET_SIZE, Upstream};

/// Forwards queries to a single upstream server over UDP.
///
/// Every exchange uses its own ephemeral socket connected to the
/// upstream, so replies can only come from that address. Replies whose id
/// does not match the query are discarded until the deadline.
#[derive(Debug, Clone)]
pub struct UdpUpstream {
    addr: SocketAddr,
    timeout: Duration,
}

impl UdpUpstream {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    async fn connect(&self) -> io::Result<UdpSocket> {
        let local: SocketAddr = if self.addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.addr).await?;
        Ok(socket)
    }
}

impl Upstream for UdpUpstream {
    async fn exchange(&self, query: &[u8]) -> Result<Vec<u8>> {
        let id = query
            .get(..2)
            .map(|b| [b[0], b[1]])
            .ok_or(Error::TruncatedMessage)?;

        let socket = self.connect().await.map_err(Error::UpstreamUnreachable)?;
        socket
            .send(query)
            .await
            .map_err(Error::UpstreamUnreachable)?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
        loop {
            let len = match timeout_at(deadline, socket.recv(&mut buf)).await {
                Ok(result) => result.map_err(Error::UpstreamUnreachable)?,
                Err(_) => return Err(Error::UpstreamTimeout(self.timeout)),
            };

            if len >= 2 && buf[..2] == id {
                buf.truncate(len);
                return Ok(buf);
            }
            debug!(upstream = %self.addr, len, "discarding reply with mismatched id");
        }
    }
}
