//! # RpcCorrelator
//!
//! Tracks outbound requests of one scene by rpc id and completes each caller exactly once:
//! with the matching response, with a timeout, or with a disposal error when the scene is
//! torn down. Whoever removes the pending record from the table owns the completion, which
//! is what makes the three outcomes mutually exclusive.

use super::RpcError;
use crate::address::{Address, SceneId};
use crate::opcode::OpCode;
use crate::protocol::Frame;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type Completion = oneshot::Sender<Result<Frame, RpcError>>;

/// Receiving half handed to the caller by [`RpcCorrelator::register`].
pub type ResponseReceiver = oneshot::Receiver<Result<Frame, RpcError>>;

/// One outstanding request.
pub struct PendingCall {
    pub rpc_id: u32,
    pub opcode: OpCode,
    pub target: Address,
    pub created_at: Instant,
    complete: Completion,
}

pub struct RpcCorrelator {
    scene: SceneId,
    next_rpc_id: AtomicU32,
    pending: Mutex<HashMap<u32, PendingCall>>,
    disposed: AtomicBool,
}

impl RpcCorrelator {
    pub fn new(scene: SceneId) -> Self {
        Self {
            scene,
            next_rpc_id: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<u32, PendingCall>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of calls still waiting for an outcome.
    pub fn pending(&self) -> usize {
        self.table().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Allocates an rpc id and records the pending call.
    ///
    /// Ids are opaque: they wrap around, skip zero, and skip ids that are still pending.
    pub fn register(&self, opcode: OpCode, target: Address) -> Result<(u32, ResponseReceiver), RpcError> {
        if self.is_disposed() {
            return Err(RpcError::Disposed(0));
        }
        let mut table = self.table();
        let rpc_id = loop {
            let id = self.next_rpc_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 && !table.contains_key(&id) {
                break id;
            }
        };
        let (complete, receiver) = oneshot::channel();
        table.insert(
            rpc_id,
            PendingCall {
                rpc_id,
                opcode,
                target,
                created_at: Instant::now(),
                complete,
            },
        );
        Ok((rpc_id, receiver))
    }

    /// Completes the pending call matching `frame.rpc_id`.
    ///
    /// Returns false for unmatched ids (already timed out, or never issued here); those are
    /// logged and dropped.
    pub fn on_response(&self, frame: Frame) -> bool {
        let rpc_id = frame.rpc_id;
        let Some(call) = self.table().remove(&rpc_id) else {
            warn!(scene = %self.scene, rpc_id, opcode = %frame.opcode, "Unmatched response dropped");
            return false;
        };
        debug!(
            scene = %self.scene,
            rpc_id,
            target = %call.target,
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            "Response"
        );
        let _ = call.complete.send(Ok(frame));
        true
    }

    /// Removes a pending call without completing it.
    pub fn cancel(&self, rpc_id: u32) -> bool {
        self.table().remove(&rpc_id).is_some()
    }

    /// Waits for the outcome of `rpc_id`, timing out after `timeout`.
    pub async fn wait(
        &self,
        rpc_id: u32,
        target: Address,
        mut receiver: ResponseReceiver,
        timeout: Duration,
    ) -> Result<Frame, RpcError> {
        let mut abandon = AbandonOnDrop { correlator: self, rpc_id, armed: true };

        let outcome = match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::Disposed(rpc_id)),
            Err(_) => {
                if self.cancel(rpc_id) {
                    warn!(scene = %self.scene, rpc_id, %target, timeout_ms = timeout.as_millis() as u64, "Rpc timed out");
                    Err(RpcError::Timeout { rpc_id, target })
                } else {
                    // Completed between the timer firing and the removal attempt.
                    receiver.try_recv().unwrap_or(Err(RpcError::Disposed(rpc_id)))
                }
            }
        };

        abandon.armed = false;
        outcome
    }

    /// Fails every pending call in one pass and refuses new ones.
    pub fn dispose(&self) -> usize {
        self.disposed.store(true, Ordering::Release);
        let drained: Vec<PendingCall> = self.table().drain().map(|(_, call)| call).collect();
        let count = drained.len();
        for call in drained {
            let _ = call.complete.send(Err(RpcError::Disposed(call.rpc_id)));
        }
        if count > 0 {
            info!(scene = %self.scene, count, "Pending calls failed on dispose");
        }
        count
    }
}

struct AbandonOnDrop<'a> {
    correlator: &'a RpcCorrelator,
    rpc_id: u32,
    armed: bool,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.correlator.cancel(self.rpc_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{OpCodeType, PackFormat};
    use bytes::Bytes;
    use std::sync::Arc;

    const OP: OpCode = OpCode::new(PackFormat::Json, OpCodeType::InnerRequest, 1);
    const REPLY: OpCode = OpCode::new(PackFormat::Json, OpCodeType::InnerResponse, 1);

    fn correlator() -> Arc<RpcCorrelator> {
        Arc::new(RpcCorrelator::new(SceneId::new(1, 1)))
    }

    fn reply(rpc_id: u32, body: &'static str) -> Frame {
        Frame::new(REPLY, rpc_id, Address::NONE, Bytes::from_static(body.as_bytes()))
    }

    #[tokio::test]
    async fn response_completes_matching_call() {
        let correlator = correlator();
        let (rpc_id, receiver) = correlator.register(OP, Address::NONE).unwrap();

        assert!(correlator.on_response(reply(rpc_id, "pong")));
        let frame = correlator
            .wait(rpc_id, Address::NONE, receiver, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frame.payload, Bytes::from_static(b"pong"));
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_wins_and_late_response_is_dropped() {
        let correlator = correlator();
        let (rpc_id, receiver) = correlator.register(OP, Address::NONE).unwrap();

        let err = correlator
            .wait(rpc_id, Address::NONE, receiver, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Timeout { .. }));
        assert_eq!(err.code(), crate::protocol::ErrorCode::ROUTE_TIMEOUT);
        assert!(!correlator.on_response(reply(rpc_id, "late")));
    }

    #[tokio::test]
    async fn dispose_fails_all_pending_once() {
        let correlator = correlator();
        let mut waits = Vec::new();
        for _ in 0..3 {
            let (rpc_id, receiver) = correlator.register(OP, Address::NONE).unwrap();
            let correlator = correlator.clone();
            waits.push(tokio::spawn(async move {
                correlator
                    .wait(rpc_id, Address::NONE, receiver, Duration::from_secs(30))
                    .await
            }));
        }

        assert_eq!(correlator.dispose(), 3);
        for wait in waits {
            assert!(matches!(wait.await.unwrap(), Err(RpcError::Disposed(_))));
        }
        assert!(matches!(correlator.register(OP, Address::NONE), Err(RpcError::Disposed(_))));
    }

    #[tokio::test]
    async fn ids_skip_zero_and_pending() {
        let correlator = correlator();
        correlator.next_rpc_id.store(u32::MAX, Ordering::Relaxed);

        let (first, _a) = correlator.register(OP, Address::NONE).unwrap();
        let (second, _b) = correlator.register(OP, Address::NONE).unwrap();
        assert_eq!(first, u32::MAX);
        assert_eq!(second, 1);
    }

    #[tokio::test]
    async fn abandoned_wait_removes_record() {
        let correlator = correlator();
        let (rpc_id, receiver) = correlator.register(OP, Address::NONE).unwrap();

        let wait = correlator.wait(rpc_id, Address::NONE, receiver, Duration::from_secs(30));
        let _ = tokio::time::timeout(Duration::from_millis(5), wait).await;
        assert_eq!(correlator.pending(), 0);
    }
}
