//! Connection endpoints that receive reply frames.
//!
//! A session travels with every frame it originated. Forwarding a frame keeps its session,
//! so the final handler replies straight to the original caller however many scenes the
//! frame crossed.

use super::Network;
use crate::address::Address;
use crate::protocol::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique session id.
pub fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Scene-to-scene traffic.
    Inner,
    /// A client connection terminated on a gate scene.
    Outer,
}

/// The transport-facing side of a connection.
pub trait Session: Send + Sync + 'static {
    fn id(&self) -> u64;

    fn kind(&self) -> SessionKind;

    /// Queues `frame` for the remote side. Never blocks.
    fn send(&self, frame: Frame);

    /// Closes the connection after a protocol violation.
    fn close(&self) {}

    fn is_closed(&self) -> bool {
        false
    }
}

/// Reply path back to a scene: responses are addressed to the scene root and routed through
/// the network of the process that issued the request.
pub struct SceneSession {
    id: u64,
    reply_to: Address,
    network: Network,
}

impl SceneSession {
    pub fn new(reply_to: Address, network: Network) -> Self {
        Self {
            id: next_session_id(),
            reply_to,
            network,
        }
    }

    pub fn reply_to(&self) -> Address {
        self.reply_to
    }
}

impl Session for SceneSession {
    fn id(&self) -> u64 {
        self.id
    }

    fn kind(&self) -> SessionKind {
        SessionKind::Inner
    }

    fn send(&self, mut frame: Frame) {
        frame.address = self.reply_to;
        let rpc_id = frame.rpc_id;
        if let Err(e) = self.network.deliver(detached(), frame) {
            warn!(reply_to = %self.reply_to, rpc_id, error = %e, "Reply undeliverable");
        }
    }
}

/// A session with nobody behind it, used as the origin of frames that never get replies.
pub struct DetachedSession;

impl Session for DetachedSession {
    fn id(&self) -> u64 {
        0
    }

    fn kind(&self) -> SessionKind {
        SessionKind::Inner
    }

    fn send(&self, frame: Frame) {
        debug!(opcode = %frame.opcode, rpc_id = frame.rpc_id, "Frame sent to detached session dropped");
    }
}

pub fn detached() -> Arc<dyn Session> {
    Arc::new(DetachedSession)
}

/// Entity-table value standing for a client connection bound on a gate scene.
///
/// Frames routed to its address are handed to the client unchanged.
pub struct SessionEntity {
    pub session: Arc<dyn Session>,
}
