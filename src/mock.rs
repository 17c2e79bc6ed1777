//! # Mock Sessions
//!
//! Utilities for asserting what the runtime sends back to a connection.
//!
//! A [`MockSession`] records every frame it is handed. Tests feed frames into a scene with
//! the mock as origin, then read the replies with [`MockSession::recv`] or
//! [`MockSession::expect_response`]. For stricter tests, queue expectations up front with
//! [`MockSession::expect`] and finish with [`MockSession::verify`].
//!
//! ```ignore
//! let client = MockSession::outer();
//! client.expect(PingResponse::OPCODE).with_rpc_id(5);
//!
//! scene.receive(client.clone(), Frame::encode(&PingRequest {}, 5, Address::NONE)?);
//!
//! let pong: PingResponse = client.expect_response(5).await;
//! client.verify();
//! ```

use crate::opcode::OpCode;
use crate::protocol::{Frame, Response};
use crate::scene::{next_session_id, Session, SessionKind};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// How long [`MockSession::recv`] waits before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Expectation {
    opcode: OpCode,
    rpc_id: Option<u32>,
}

/// A session that records the frames sent to it.
pub struct MockSession {
    id: u64,
    kind: SessionKind,
    sender: mpsc::UnboundedSender<Frame>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    mismatches: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockSession {
    pub fn new(kind: SessionKind) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: next_session_id(),
            kind,
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            mismatches: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// A client connection.
    pub fn outer() -> Arc<Self> {
        Self::new(SessionKind::Outer)
    }

    /// A scene-to-scene connection.
    pub fn inner() -> Arc<Self> {
        Self::new(SessionKind::Inner)
    }

    /// The next recorded frame, or `None` after [`RECV_TIMEOUT`].
    pub async fn recv(&self) -> Option<Frame> {
        let mut receiver = self.receiver.lock().await;
        tokio::time::timeout(RECV_TIMEOUT, receiver.recv()).await.ok().flatten()
    }

    /// The next recorded frame if one is already there.
    pub fn try_recv(&self) -> Option<Frame> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }

    /// Receives the next frame and decodes it as the response to `rpc_id`.
    ///
    /// # Panics
    ///
    /// If nothing arrives in time or the frame is not an `R` for `rpc_id`.
    pub async fn expect_response<R: Response>(&self, rpc_id: u32) -> R {
        let Some(frame) = self.recv().await else {
            panic!("No frame received, expected response {} for rpc {rpc_id}", R::OPCODE);
        };
        assert_eq!(frame.opcode, R::OPCODE, "Unexpected response opcode");
        assert_eq!(frame.rpc_id, rpc_id, "Response for the wrong rpc");
        match R::decode(&frame.payload) {
            Ok(response) => response,
            Err(e) => panic!("Response {} does not decode: {e}", R::OPCODE),
        }
    }

    /// Expects the next frame sent to this session to carry `opcode`.
    pub fn expect(&self, opcode: OpCode) -> ExpectationBuilder {
        self.expectations.lock().unwrap().push_back(Expectation { opcode, rpc_id: None });
        ExpectationBuilder {
            expectations: Arc::clone(&self.expectations),
        }
    }

    /// Panics unless every expectation was met in order.
    pub fn verify(&self) {
        let mismatches = self.mismatches.lock().unwrap();
        if !mismatches.is_empty() {
            panic!("Unexpected frames: {}", mismatches.join("; "));
        }
        let remaining = self.expectations.lock().unwrap().len();
        if remaining > 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
    }
}

impl Session for MockSession {
    fn id(&self) -> u64 {
        self.id
    }

    fn kind(&self) -> SessionKind {
        self.kind
    }

    fn send(&self, frame: Frame) {
        let expected = self.expectations.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        if let Some(expected) = expected {
            let rpc_matches = expected.rpc_id.map_or(true, |id| id == frame.rpc_id);
            if expected.opcode != frame.opcode || !rpc_matches {
                self.mismatches.lock().unwrap_or_else(|e| e.into_inner()).push(format!(
                    "got {} rpc {}, expected {} rpc {:?}",
                    frame.opcode, frame.rpc_id, expected.opcode, expected.rpc_id
                ));
            }
        }
        let _ = self.sender.send(frame);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Refines the expectation most recently queued with [`MockSession::expect`].
pub struct ExpectationBuilder {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl ExpectationBuilder {
    pub fn with_rpc_id(self, rpc_id: u32) {
        if let Some(last) = self.expectations.lock().unwrap().back_mut() {
            last.rpc_id = Some(rpc_id);
        }
    }
}
