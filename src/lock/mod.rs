//! Asynchronous locks keyed by arbitrary values.
//!
//! - [`CoroutineLock`]: strict per-key FIFO mutual exclusion with timeouts.
//! - [`FlowLock`]: bounded concurrency, serializing equal ids while letting up to `N`
//!   distinct slots proceed.

pub mod coroutine;
pub mod error;
pub mod flow;

pub use coroutine::*;
pub use error::*;
pub use flow::*;

/// Something a scene tears down together with itself.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

impl<T: Disposable + ?Sized> Disposable for std::sync::Arc<T> {
    fn dispose(&self) {
        (**self).dispose();
    }
}
