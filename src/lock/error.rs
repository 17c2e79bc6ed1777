//! Error types for locks.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LockError {
    /// The waiter was not granted the key in time and has left the queue.
    #[error("Lock {lock} timed out after {timeout_ms}ms waiting for key {key}")]
    Timeout {
        lock: String,
        key: String,
        timeout_ms: u64,
    },

    /// The lock instance was disposed before the wait started.
    #[error("Lock {0} is disposed")]
    Disposed(String),
}
