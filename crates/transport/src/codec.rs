//! Wire codec
//!
//! Messages travel as JSON documents tagged with their variant name. Frames
//! larger than the fixed receive buffer are protocol errors on both sides.

use crate::error::{TransportError, TransportResult};
use crate::message::Message;

/// Size of every worker's receive buffer.
pub const MAX_FRAME_BYTES: usize = 1024;

/// Serialize a message into a frame.
pub fn encode(message: &Message) -> TransportResult<Vec<u8>> {
    let frame = serde_json::to_vec(message).map_err(TransportError::Encode)?;
    check_size(frame.len())?;
    Ok(frame)
}

/// Deserialize a frame, rejecting unknown variants and oversized input.
pub fn decode(frame: &[u8]) -> TransportResult<Message> {
    check_size(frame.len())?;
    serde_json::from_slice(frame).map_err(TransportError::Decode)
}

fn check_size(size: usize) -> TransportResult<()> {
    if size > MAX_FRAME_BYTES {
        return Err(TransportError::Oversized {
            size,
            limit: MAX_FRAME_BYTES,
        });
    }
    Ok(())
}
