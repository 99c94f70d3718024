//! UDP transport for DNS queries.
//!
//! Receives client datagrams on one socket and hands each to its own task.
//! The task runs the resolver (which may wait on the upstream) and sends
//! the response back from the same socket, so a slow upstream lookup never
//! holds up other clients.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::resolver::Resolver;

use super::{MAX_DNS_PACKET_SIZE, Upstream};

/// UDP transport for the resolver.
///
/// Binds to a local address and answers queries through a [`Resolver`].
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the client-facing socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the UDP transport.
    ///
    /// Spawns the receive loop; at most `max_in_flight` datagrams are
    /// handled concurrently; further ones wait in the socket buffer.
    pub fn start<U: Upstream>(
        self,
        resolver: Arc<Resolver<U>>,
        max_in_flight: usize,
    ) -> JoinHandle<()> {
        tokio::spawn(run(self.socket, resolver, max_in_flight.max(1)))
    }
}

/// Main receive loop for the UDP transport.
async fn run<U: Upstream>(socket: Arc<UdpSocket>, resolver: Arc<Resolver<U>>, max_in_flight: usize) {
    let permits = Arc::new(Semaphore::new(max_in_flight));
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

    loop {
        // Wait for a free worker before taking the next datagram.
        let Ok(permit) = permits.clone().acquire_owned().await else {
            return;
        };

        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                // ICMP errors from earlier sends surface here on some platforms.
                debug!(error = %e, "UDP recv error");
                continue;
            }
        };

        let datagram = buf[..len].to_vec();
        let socket = socket.clone();
        let resolver = resolver.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Some(response) = resolver.resolve(&datagram).await.into_response() {
                if let Err(e) = socket.send_to(&response, src).await {
                    warn!(client = %src, error = %e, "UDP response error");
                }
            }
        });
    }
}
