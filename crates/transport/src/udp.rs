//! UDP transport: one datagram per message.

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::codec::{self, MAX_FRAME_BYTES};
use crate::error::TransportResult;
use crate::message::{Endpoint, Envelope, Message};
use crate::transport::Transport;

/// Datagram transport bound to a single local endpoint.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local: Endpoint,
}

impl UdpTransport {
    /// Bind a socket on `addr`. Port `0` picks an ephemeral port.
    pub async fn bind(addr: Endpoint) -> TransportResult<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local = socket.local_addr()?;
        debug!(%local, "UDP transport bound");
        Ok(Self { socket, local })
    }
}

impl Transport for UdpTransport {
    fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    async fn send(&self, message: &Message, destination: Endpoint) -> TransportResult<()> {
        let frame = codec::encode(message)?;
        self.socket.send_to(&frame, destination).await?;
        debug!(kind = message.kind(), %destination, bytes = frame.len(), "Datagram sent");
        Ok(())
    }

    async fn recv(&self) -> TransportResult<Envelope> {
        // One spare byte so a truncated oversized datagram is still detected
        let mut buf = [0u8; MAX_FRAME_BYTES + 1];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            match codec::decode(&buf[..len]) {
                Ok(message) => return Ok(Envelope { from, message }),
                Err(e) => warn!(%from, error = %e, "Discarding malformed datagram"),
            }
        }
    }
}
