//! Unreliable point-to-point delivery contract.

use std::future::Future;

use crate::error::TransportResult;
use crate::message::{Endpoint, Envelope, Message};

/// Connectionless, best-effort message delivery.
///
/// `send` never waits for the peer: a message may be lost, and two messages
/// to the same destination may arrive in either order. `recv` is the only
/// suspension point of a worker's read loop.
pub trait Transport: Send + Sync + 'static {
    /// Endpoint this transport receives on.
    fn local_endpoint(&self) -> Endpoint;

    /// Serialize `message` and hand it to the network for `destination`.
    ///
    /// Returns an error only when the message cannot be framed or the local
    /// socket fails; loss in flight is silent.
    fn send(
        &self,
        message: &Message,
        destination: Endpoint,
    ) -> impl Future<Output = TransportResult<()>> + Send;

    /// Wait for exactly one well-formed message addressed to this endpoint.
    ///
    /// Malformed, oversized or unknown frames are logged and discarded; the
    /// call keeps waiting for the next frame.
    fn recv(&self) -> impl Future<Output = TransportResult<Envelope>> + Send;
}
