//! Error types for Emberwatch transport operations.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur while moving messages between workers.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket I/O errors
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Message could not be serialized
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Frame is not a known message variant
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// Frame does not fit the fixed receive buffer
    #[error("Frame of {size} bytes exceeds the {limit} byte buffer")]
    Oversized {
        /// Encoded size
        size: usize,
        /// Receive buffer size
        limit: usize,
    },

    /// Endpoint already bound on the in-process network
    #[error("Endpoint already bound: {0}")]
    AddrInUse(SocketAddr),

    /// Receiving side has gone away
    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// Protocol errors discard the frame but leave the transport usable
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            TransportError::Decode(_) | TransportError::Oversized { .. }
        )
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
