//! Error types for addressing.

use thiserror::Error;

/// Errors produced while building addresses or scene ids.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AddressError {
    /// The value does not decompose into an 8-bit world and an 8-bit index.
    #[error("Invalid scene id: {0}")]
    InvalidSceneId(u32),
}
