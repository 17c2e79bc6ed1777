//! Bounded-concurrency lock.
//!
//! `N` single-permit slots; an id always maps to slot `id mod N`, so work for one id is
//! serialized (tokio semaphores are fair) while up to `N` different slots run at once.
//! Used to cap fan-out such as storage calls.

use super::{Disposable, LockError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

pub struct FlowLock {
    name: String,
    slots: Vec<Arc<Semaphore>>,
    next_slot: AtomicUsize,
    active: Arc<AtomicUsize>,
    default_timeout: Duration,
}

/// A held slot. Dropping it frees the slot.
pub struct FlowPermit {
    slot: usize,
    active: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl FlowPermit {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl Drop for FlowPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl FlowLock {
    pub fn new(name: impl Into<String>, slots: usize, default_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            slots: (0..slots.max(1)).map(|_| Arc::new(Semaphore::new(1))).collect(),
            next_slot: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            default_timeout,
        }
    }

    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently held.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Waits for the slot owned by `id`.
    pub async fn wait(&self, id: i64) -> Result<FlowPermit, LockError> {
        let slot = id.rem_euclid(self.slots.len() as i64) as usize;
        self.acquire(slot, self.default_timeout).await
    }

    /// Waits for the next slot in round-robin order, for work with no natural id.
    pub async fn wait_if_too_much(&self) -> Result<FlowPermit, LockError> {
        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        self.acquire(slot, self.default_timeout).await
    }

    async fn acquire(&self, slot: usize, timeout: Duration) -> Result<FlowPermit, LockError> {
        let semaphore = Arc::clone(&self.slots[slot]);
        match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => {
                self.active.fetch_add(1, Ordering::AcqRel);
                Ok(FlowPermit {
                    slot,
                    active: Arc::clone(&self.active),
                    _permit: permit,
                })
            }
            Ok(Err(_)) => Err(LockError::Disposed(self.name.clone())),
            Err(_) => {
                warn!(lock = %self.name, slot, "Flow lock wait timed out");
                Err(LockError::Timeout {
                    lock: self.name.clone(),
                    key: slot.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Fails every current and future waiter.
    pub fn close(&self) {
        for slot in &self.slots {
            slot.close();
        }
    }
}

impl Disposable for FlowLock {
    fn dispose(&self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_id_is_serialized_distinct_slots_run_together() {
        let lock = FlowLock::new("db", 4, Duration::from_secs(1));

        let a = lock.wait(10).await.unwrap();
        let b = lock.wait(11).await.unwrap();
        assert_ne!(a.slot(), b.slot());
        assert_eq!(lock.active(), 2);

        let blocked = tokio::time::timeout(Duration::from_millis(20), lock.wait(14)).await;
        assert!(blocked.is_err(), "14 shares slot 2 with 10");

        drop(a);
        let c = lock.wait(14).await.unwrap();
        assert_eq!(c.slot(), 2);
    }

    #[tokio::test]
    async fn negative_ids_map_into_range() {
        let lock = FlowLock::new("db", 3, Duration::from_secs(1));
        let permit = lock.wait(-1).await.unwrap();
        assert_eq!(permit.slot(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn close_fails_waiters() {
        let lock = Arc::new(FlowLock::new("db", 1, Duration::from_secs(60)));
        let _held = lock.wait_if_too_much().await.unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.wait(0).await })
        };
        tokio::task::yield_now().await;
        lock.close();

        assert!(matches!(waiter.await.unwrap(), Err(LockError::Disposed(_))));
    }
}
