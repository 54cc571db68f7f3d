//! In-process network
//!
//! Every worker of a single-process deployment binds an endpoint on a shared
//! `LocalNetwork`. Frames are encoded exactly as on the wire, delivered over
//! unbounded channels so senders never wait on a peer, and may be dropped
//! with a configurable probability.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::codec;
use crate::error::{TransportError, TransportResult};
use crate::message::{Endpoint, Envelope, Message};
use crate::transport::Transport;

#[derive(Debug)]
struct Frame {
    from: Endpoint,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct LossModel {
    probability: f64,
    rng: StdRng,
}

#[derive(Debug, Default)]
struct NetworkInner {
    routes: Mutex<HashMap<Endpoint, mpsc::UnboundedSender<Frame>>>,
    loss: Option<Mutex<LossModel>>,
}

/// Shared switchboard for in-process transports.
#[derive(Debug, Clone, Default)]
pub struct LocalNetwork {
    inner: Arc<NetworkInner>,
}

impl LocalNetwork {
    /// Create a network that delivers every frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a network that drops each frame with `probability`
    pub fn with_loss(probability: f64, seed: u64) -> Self {
        let loss = (probability > 0.0).then(|| {
            Mutex::new(LossModel {
                probability,
                rng: StdRng::seed_from_u64(seed),
            })
        });
        Self {
            inner: Arc::new(NetworkInner {
                routes: Mutex::new(HashMap::new()),
                loss,
            }),
        }
    }

    /// Bind a new transport on `endpoint`
    pub fn bind(&self, endpoint: Endpoint) -> TransportResult<LocalTransport> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut routes = self.routes();
            if routes.contains_key(&endpoint) {
                return Err(TransportError::AddrInUse(endpoint));
            }
            routes.insert(endpoint, tx);
        }
        debug!(%endpoint, "Local transport bound");
        Ok(LocalTransport {
            local: endpoint,
            network: self.clone(),
            inbox: tokio::sync::Mutex::new(rx),
        })
    }

    /// Whether an endpoint is currently bound
    pub fn is_bound(&self, endpoint: &Endpoint) -> bool {
        self.routes().contains_key(endpoint)
    }

    /// Deliver raw bytes as if they arrived from `from`.
    ///
    /// Bypasses the encoder, so malformed frames can reach a receiver.
    pub fn inject_raw(&self, from: Endpoint, to: Endpoint, bytes: Vec<u8>) {
        self.deliver(to, Frame { from, bytes });
    }

    fn routes(&self) -> std::sync::MutexGuard<'_, HashMap<Endpoint, mpsc::UnboundedSender<Frame>>> {
        self.inner.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn should_drop(&self) -> bool {
        match &self.inner.loss {
            Some(loss) => {
                let mut loss = loss.lock().unwrap_or_else(PoisonError::into_inner);
                let probability = loss.probability;
                loss.rng.gen_bool(probability)
            }
            None => false,
        }
    }

    fn deliver(&self, to: Endpoint, frame: Frame) {
        let routes = self.routes();
        match routes.get(&to) {
            // A closed receiver is indistinguishable from loss
            Some(tx) => {
                let _ = tx.send(frame);
            }
            None => debug!(%to, "No endpoint bound, frame lost"),
        }
    }

    fn unbind(&self, endpoint: &Endpoint) {
        self.routes().remove(endpoint);
    }
}

/// Transport bound on a `LocalNetwork`.
#[derive(Debug)]
pub struct LocalTransport {
    local: Endpoint,
    network: LocalNetwork,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
}

impl Transport for LocalTransport {
    fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    async fn send(&self, message: &Message, destination: Endpoint) -> TransportResult<()> {
        let bytes = codec::encode(message)?;
        if self.network.should_drop() {
            debug!(kind = message.kind(), %destination, "Frame dropped in flight");
            return Ok(());
        }
        self.network.deliver(
            destination,
            Frame {
                from: self.local,
                bytes,
            },
        );
        Ok(())
    }

    async fn recv(&self) -> TransportResult<Envelope> {
        let mut inbox = self.inbox.lock().await;
        loop {
            let frame = inbox.recv().await.ok_or(TransportError::Closed)?;
            match codec::decode(&frame.bytes) {
                Ok(message) => {
                    return Ok(Envelope {
                        from: frame.from,
                        message,
                    })
                }
                Err(e) => warn!(from = %frame.from, error = %e, "Discarding malformed frame"),
            }
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.network.unbind(&self.local);
    }
}
