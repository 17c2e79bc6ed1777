//! # Addressable Directory
//!
//! Stable `i64` keys mapped to the address currently owning them, so callers can reach an
//! entity that moves between scenes.
//!
//! - [`AddressableManager`]: the directory records on a directory scene.
//! - [`AddressableClient`]: resolve-and-call from any scene, with retry while the owner moves.
//! - [`handlers()`]: the directory's wire handlers.

pub mod client;
pub mod error;
pub mod handlers;
pub mod manager;

pub use client::*;
pub use error::*;
pub use handlers::handlers;
pub use manager::*;
