//! Emberwatch Transport
//!
//! Message envelope and delivery primitives binding the scheduler, the
//! incident source and the drones together:
//! - Typed message variants with a self-describing JSON wire format
//! - The `Transport` contract: fire-and-forget `send`, blocking `recv`
//! - `UdpTransport` for multi-process deployments
//! - `LocalNetwork` for single-process deployments, with optional frame loss
//! - `Mailbox`, a capacity-one handoff for in-process producer/consumer pairs

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod local;
pub mod mailbox;
pub mod message;
pub mod transport;
pub mod udp;

pub use codec::{decode, encode, MAX_FRAME_BYTES};
pub use error::{TransportError, TransportResult};
pub use local::{LocalNetwork, LocalTransport};
pub use mailbox::Mailbox;
pub use message::{DronePhase, DroneSnapshot, Endpoint, Envelope, Message};
pub use transport::Transport;
pub use udp::UdpTransport;
