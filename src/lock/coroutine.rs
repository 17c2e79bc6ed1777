//! # CoroutineLock
//!
//! An asynchronous mutex per key with FIFO hand-off.
//!
//! ## Semantics
//!
//! - A key present in the table is held; its queue holds the waiters behind the holder.
//! - [`CoroutineLock::wait`] takes its place in the queue *when it is called*, not when it is
//!   first polled, so callers that enqueue in order are granted in order.
//! - Granting sends on the waiter's oneshot channel. The waiter resumes the next time its own
//!   task is polled, never inside the releasing call.
//! - A waiter that times out leaves the queue; the holder and later waiters are unaffected.
//! - A wait that is dropped before completion leaves the queue, or passes the key on if it
//!   had already been granted.
//! - [`CoroutineLock::dispose`] grants every queued waiter in FIFO order and rejects new waits.

use super::{Disposable, LockError};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Sleep;
use tracing::{debug, warn};

/// Bound for anything usable as a lock key.
pub trait LockKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + Debug + Send + Sync + 'static> LockKey for T {}

struct Waiter {
    id: u64,
    grant: oneshot::Sender<()>,
}

struct LockState<K: LockKey> {
    name: String,
    default_timeout: Duration,
    queues: Mutex<HashMap<K, VecDeque<Waiter>>>,
    next_waiter: AtomicU64,
    disposed: AtomicBool,
}

impl<K: LockKey> LockState<K> {
    fn queues(&self) -> MutexGuard<'_, HashMap<K, VecDeque<Waiter>>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, key: &K) {
        let mut queues = self.queues();
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let Some(queue) = queues.get_mut(key) else {
            return;
        };
        while let Some(waiter) = queue.pop_front() {
            if waiter.grant.send(()).is_ok() {
                debug!(lock = %self.name, ?key, waiter = waiter.id, "Granted");
                return;
            }
        }
        queues.remove(key);
    }

    /// Removes a queued waiter. Returns false if it is no longer queued (it was granted).
    fn remove_waiter(&self, key: &K, id: u64) -> bool {
        let mut queues = self.queues();
        if let Some(queue) = queues.get_mut(key) {
            if let Some(position) = queue.iter().position(|w| w.id == id) {
                queue.remove(position);
                return true;
            }
        }
        false
    }
}

/// Per-key FIFO async mutex. Cloning shares the same lock instance.
pub struct CoroutineLock<K: LockKey> {
    state: Arc<LockState<K>>,
}

impl<K: LockKey> Clone for CoroutineLock<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K: LockKey> CoroutineLock<K> {
    pub fn new(name: impl Into<String>, default_timeout: Duration) -> Self {
        Self {
            state: Arc::new(LockState {
                name: name.into(),
                default_timeout,
                queues: Mutex::new(HashMap::new()),
                next_waiter: AtomicU64::new(1),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Waits for `key` with the lock's default timeout.
    pub fn wait(&self, key: K) -> LockWait<K> {
        self.wait_timeout(key, self.state.default_timeout)
    }

    pub fn wait_timeout(&self, key: K, timeout: Duration) -> LockWait<K> {
        // Checked under the queue lock so a wait is either drained by dispose or refused.
        let mut queues = self.state.queues();
        if self.is_disposed() {
            return LockWait {
                state: WaitState::Failed(LockError::Disposed(self.state.name.clone())),
            };
        }

        match queues.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(VecDeque::new());
                LockWait {
                    state: WaitState::Ready(LockGuard::new(Arc::clone(&self.state), key)),
                }
            }
            Entry::Occupied(mut occupied) => {
                let id = self.state.next_waiter.fetch_add(1, Ordering::Relaxed);
                let (grant, granted) = oneshot::channel();
                occupied.get_mut().push_back(Waiter { id, grant });
                debug!(lock = %self.state.name, ?key, waiter = id, queued = occupied.get().len(), "Queued");
                LockWait {
                    state: WaitState::Queued(Queued {
                        state: Arc::clone(&self.state),
                        key,
                        id,
                        granted,
                        deadline: Box::pin(tokio::time::sleep(timeout)),
                        timeout,
                        armed: true,
                    }),
                }
            }
        }
    }

    pub fn is_held(&self, key: &K) -> bool {
        self.state.queues().contains_key(key)
    }

    /// Number of waiters queued behind the holder of `key`.
    pub fn waiting(&self, key: &K) -> usize {
        self.state.queues().get(key).map_or(0, VecDeque::len)
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::Acquire)
    }

    /// Grants every queued waiter in FIFO order and rejects later waits.
    pub fn dispose(&self) {
        let drained = {
            let mut queues = self.state.queues();
            if self.state.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *queues)
        };
        let mut released = 0usize;
        for (_, queue) in drained {
            for waiter in queue {
                if waiter.grant.send(()).is_ok() {
                    released += 1;
                }
            }
        }
        debug!(lock = %self.state.name, released, "Disposed");
    }
}

impl<K: LockKey> Disposable for CoroutineLock<K> {
    fn dispose(&self) {
        CoroutineLock::dispose(self);
    }
}

/// Holding a key. Dropping the guard releases it to the next waiter.
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct LockGuard<K: LockKey> {
    state: Arc<LockState<K>>,
    key: Option<K>,
}

impl<K: LockKey> LockGuard<K> {
    fn new(state: Arc<LockState<K>>, key: K) -> Self {
        Self { state, key: Some(key) }
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn release(mut self) {
        if let Some(key) = self.key.take() {
            self.state.release(&key);
        }
    }
}

impl<K: LockKey> Drop for LockGuard<K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.state.release(&key);
        }
    }
}

impl<K: LockKey> Debug for LockGuard<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("lock", &self.state.name)
            .field("key", &self.key)
            .finish()
    }
}

struct Queued<K: LockKey> {
    state: Arc<LockState<K>>,
    key: K,
    id: u64,
    granted: oneshot::Receiver<()>,
    deadline: Pin<Box<Sleep>>,
    timeout: Duration,
    armed: bool,
}

impl<K: LockKey> Queued<K> {
    fn into_guard(mut self) -> LockGuard<K> {
        self.armed = false;
        LockGuard::new(Arc::clone(&self.state), self.key.clone())
    }

    fn disposed(mut self) -> LockError {
        self.armed = false;
        LockError::Disposed(self.state.name.clone())
    }
}

impl<K: LockKey> Drop for Queued<K> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Abandoned before completion: leave the queue, or hand on a grant we never observed.
        if !self.state.remove_waiter(&self.key, self.id) {
            self.state.release(&self.key);
        }
    }
}

enum WaitState<K: LockKey> {
    Ready(LockGuard<K>),
    Failed(LockError),
    Queued(Queued<K>),
    Done,
}

/// Pending acquisition returned by [`CoroutineLock::wait`].
#[must_use = "the waiter keeps its queue position until awaited or dropped"]
pub struct LockWait<K: LockKey> {
    state: WaitState<K>,
}

// No field is structurally pinned (the timer is boxed), so moving is sound.
impl<K: LockKey> Unpin for LockWait<K> {}

impl<K: LockKey> Future for LockWait<K> {
    type Output = Result<LockGuard<K>, LockError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut queued = match std::mem::replace(&mut this.state, WaitState::Done) {
            WaitState::Ready(guard) => return Poll::Ready(Ok(guard)),
            WaitState::Failed(e) => return Poll::Ready(Err(e)),
            WaitState::Queued(queued) => queued,
            WaitState::Done => panic!("LockWait polled after completion"),
        };

        match Pin::new(&mut queued.granted).poll(cx) {
            Poll::Ready(Ok(())) => return Poll::Ready(Ok(queued.into_guard())),
            Poll::Ready(Err(_)) => return Poll::Ready(Err(queued.disposed())),
            Poll::Pending => {}
        }

        if queued.deadline.as_mut().poll(cx).is_ready() {
            if queued.state.remove_waiter(&queued.key, queued.id) {
                queued.armed = false;
                warn!(
                    lock = %queued.state.name,
                    key = ?queued.key,
                    timeout_ms = queued.timeout.as_millis() as u64,
                    "Lock wait timed out"
                );
                return Poll::Ready(Err(LockError::Timeout {
                    lock: queued.state.name.clone(),
                    key: format!("{:?}", queued.key),
                    timeout_ms: queued.timeout.as_millis() as u64,
                }));
            }
            // Granted between the two polls; the grant is already in the channel.
            return match queued.granted.try_recv() {
                Ok(()) => Poll::Ready(Ok(queued.into_guard())),
                Err(_) => Poll::Ready(Err(queued.disposed())),
            };
        }

        this.state = WaitState::Queued(queued);
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    fn lock() -> CoroutineLock<i64> {
        CoroutineLock::new("test", Duration::from_secs(30))
    }

    #[tokio::test]
    async fn uncontended_wait_is_immediate() {
        let lock = lock();
        let guard = lock.wait(1).await.unwrap();
        assert!(lock.is_held(&1));
        drop(guard);
        assert!(!lock.is_held(&1));
    }

    #[tokio::test]
    async fn waiters_are_granted_in_arrival_order() {
        let lock = lock();
        let holder = lock.wait(7).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for n in 0..5 {
            let wait = lock.wait(7);
            let tx = tx.clone();
            tokio::spawn(async move {
                let guard = wait.await.unwrap();
                tx.send(n).unwrap();
                tokio::task::yield_now().await;
                drop(guard);
            });
        }
        assert_eq!(lock.waiting(&7), 5);

        drop(holder);
        let mut order = Vec::new();
        for _ in 0..5 {
            order.push(rx.recv().await.unwrap());
        }
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn at_most_one_holder_per_key() {
        let lock = lock();
        let inside = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();

        for _ in 0..20 {
            let lock = lock.clone();
            let inside = inside.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = lock.wait(3).await.unwrap();
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::task::yield_now().await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(!lock.is_held(&3));
    }

    #[tokio::test]
    async fn release_does_not_run_the_next_holder_inline() {
        let lock = lock();
        let holder = lock.wait(1).await.unwrap();
        let resumed = Arc::new(AtomicBool::new(false));

        let wait = lock.wait(1);
        let flag = resumed.clone();
        let task = tokio::spawn(async move {
            let _guard = wait.await.unwrap();
            flag.store(true, Ordering::SeqCst);
        });

        holder.release();
        assert!(!resumed.load(Ordering::SeqCst));
        task.await.unwrap();
        assert!(resumed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_queue_without_poisoning() {
        let lock = lock();
        let holder = lock.wait(9).await.unwrap();

        let err = lock.wait_timeout(9, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
        assert_eq!(lock.waiting(&9), 0);

        let next = lock.wait(9);
        drop(holder);
        let guard = next.await.unwrap();
        assert_eq!(guard.key(), Some(&9));
    }

    #[tokio::test]
    async fn dropped_wait_leaves_queue() {
        let lock = lock();
        let holder = lock.wait(2).await.unwrap();

        let abandoned = lock.wait(2);
        let next = lock.wait(2);
        drop(abandoned);
        assert_eq!(lock.waiting(&2), 1);

        drop(holder);
        next.await.unwrap();
    }

    #[tokio::test]
    async fn grant_to_dropped_wait_is_passed_on() {
        let lock = lock();
        let holder = lock.wait(4).await.unwrap();

        let granted_never_polled = lock.wait(4);
        let next = lock.wait(4);
        drop(holder);
        drop(granted_never_polled);

        next.await.unwrap();
    }

    #[tokio::test]
    async fn dispose_releases_every_waiter() {
        let lock = lock();
        let _never_released = lock.wait(5).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for n in 0..3 {
            let wait = lock.wait(5);
            let tx = tx.clone();
            tokio::spawn(async move {
                if wait.await.is_ok() {
                    tx.send(n).unwrap();
                }
            });
        }

        lock.dispose();
        let mut released = Vec::new();
        for _ in 0..3 {
            released.push(rx.recv().await.unwrap());
        }
        released.sort();
        assert_eq!(released, vec![0, 1, 2]);
        assert!(matches!(lock.wait(5).await, Err(LockError::Disposed(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waits_racing_dispose_never_outlive_it() {
        let lock = CoroutineLock::<i64>::new("race", Duration::from_secs(60));
        let _held = lock.wait(9).await.unwrap();

        let mut waits = Vec::new();
        for _ in 0..64 {
            let lock = lock.clone();
            waits.push(tokio::spawn(async move { lock.wait(9).await.map(drop) }));
        }
        lock.dispose();

        for wait in waits {
            let outcome = tokio::time::timeout(Duration::from_secs(5), wait)
                .await
                .expect("wait outlived dispose")
                .unwrap();
            assert!(matches!(outcome, Ok(()) | Err(LockError::Disposed(_))));
        }
    }

    #[tokio::test]
    async fn wait_after_dispose_fails_on_a_held_key() {
        let lock = lock();
        let held = lock.wait(3).await.unwrap();
        lock.dispose();

        assert!(matches!(lock.wait(3).await, Err(LockError::Disposed(_))));
        assert_eq!(lock.waiting(&3), 0);
        drop(held);
        assert!(matches!(lock.wait(4).await, Err(LockError::Disposed(_))));
    }
}
