//! Error types for scenes and the process network.

use crate::address::SceneId;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SceneError {
    /// The scene no longer accepts work.
    #[error("Scene {0} is disposed")]
    Disposed(SceneId),

    /// A scene with this id already exists in the process.
    #[error("Scene {0} already exists")]
    AlreadyExists(SceneId),
}

/// Delivery failures between scenes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NetworkError {
    /// Neither a local scene nor a transport is known for the target.
    #[error("No route to scene {0}")]
    NoRoute(SceneId),

    /// The transport's peer has shut down.
    #[error("Peer for scene {0} is gone")]
    PeerGone(SceneId),
}
