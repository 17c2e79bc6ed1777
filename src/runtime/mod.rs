//! Runtime orchestration and lifecycle management.
//!
//! - [`Process`]: owns the network and the dispatcher, creates scenes, connects peer
//!   processes and shuts everything down.
//! - [`setup_tracing`]: installs the log subscriber.

pub mod process;
pub mod tracing;

pub use process::*;
pub use tracing::*;
