//! Scenes, sessions and the process network.
//!
//! - [`Scene`]: the single-logical-thread execution context and its entity table.
//! - [`Session`]: where reply frames go.
//! - [`Network`]: delivery by the scene id embedded in a frame's address.

pub mod entity;
pub mod error;
pub mod network;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod session;

pub use entity::*;
pub use error::*;
pub use network::*;
pub use scene::*;
pub use session::*;
