//! # Actor Addressing
//!
//! Every entity in the cluster is identified by an [`Address`]: a 64-bit value that embeds
//! the id of the scene that owns it. Any process can compute the owning scene of an address
//! by masking bits, so routing never needs a lookup service.
//!
//! ## Layout
//!
//! ```text
//!  63  62            40 39      32 31      24 23               0
//! +---+----------------+----------+----------+------------------+
//! | 0 |  time (23 bit) | scene ix |  world   | sequence (24 bit)|
//! +---+----------------+----------+----------+------------------+
//! ```
//!
//! A [`SceneId`] is `world * 1000 + index`. The scene's own root address has both `time`
//! and `sequence` set to zero; entity addresses produced by [`AddressFactory`] always carry
//! a non-zero time, so the two can never collide.

pub mod error;
pub mod factory;

pub use error::*;
pub use factory::*;

use serde::{Deserialize, Serialize};
use std::fmt;

const SEQUENCE_BITS: u32 = 24;
const WORLD_BITS: u32 = 8;
const SCENE_INDEX_BITS: u32 = 8;
const TIME_BITS: u32 = 23;

const WORLD_SHIFT: u32 = SEQUENCE_BITS;
const SCENE_INDEX_SHIFT: u32 = WORLD_SHIFT + WORLD_BITS;
const TIME_SHIFT: u32 = SCENE_INDEX_SHIFT + SCENE_INDEX_BITS;

pub(crate) const MAX_SEQUENCE: u32 = (1 << SEQUENCE_BITS) - 1;
pub(crate) const MAX_TIME: u32 = (1 << TIME_BITS) - 1;

/// Identity of a scene: `world * 1000 + index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SceneId(u32);

impl SceneId {
    /// Builds a scene id from its world and per-world index.
    pub const fn new(world: u8, index: u8) -> Self {
        Self(world as u32 * 1000 + index as u32)
    }

    pub const fn world(self) -> u8 {
        (self.0 / 1000) as u8
    }

    pub const fn index(self) -> u8 {
        (self.0 % 1000) as u8
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for SceneId {
    type Error = AddressError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let world = value / 1000;
        let index = value % 1000;
        if world > u8::MAX as u32 || index > u8::MAX as u32 {
            return Err(AddressError::InvalidSceneId(value));
        }
        Ok(Self(value))
    }
}

impl From<SceneId> for u32 {
    fn from(scene: SceneId) -> Self {
        scene.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque 64-bit identity of an entity (or of a scene, for its root address).
///
/// `Address::NONE` (zero) means "not actor-scoped" on the wire.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Address(i64);

impl Address {
    pub const NONE: Address = Address(0);

    /// Packs the address fields. `time` and `sequence` are masked to their field widths.
    pub const fn new(scene: SceneId, time: u32, sequence: u32) -> Self {
        let raw = ((time as u64 & MAX_TIME as u64) << TIME_SHIFT)
            | ((scene.index() as u64) << SCENE_INDEX_SHIFT)
            | ((scene.world() as u64) << WORLD_SHIFT)
            | (sequence as u64 & MAX_SEQUENCE as u64);
        Self(raw as i64)
    }

    /// The root address of a scene, used to reach scene-level services.
    pub const fn for_scene(scene: SceneId) -> Self {
        Self::new(scene, 0, 0)
    }

    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The scene that owns this address.
    pub const fn scene_id(self) -> SceneId {
        let raw = self.0 as u64;
        let world = (raw >> WORLD_SHIFT) as u8;
        let index = (raw >> SCENE_INDEX_SHIFT) as u8;
        SceneId::new(world, index)
    }

    pub const fn time(self) -> u32 {
        ((self.0 as u64 >> TIME_SHIFT) & MAX_TIME as u64) as u32
    }

    pub const fn sequence(self) -> u32 {
        (self.0 as u64 & MAX_SEQUENCE as u64) as u32
    }

    /// True for the root address of the owning scene.
    pub const fn is_scene_root(self) -> bool {
        !self.is_none() && self.time() == 0 && self.sequence() == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Address> for i64 {
    fn from(address: Address) -> Self {
        address.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_round_trip() {
        let scene = SceneId::new(3, 17);
        let address = Address::new(scene, 12_345, 678);

        assert_eq!(address.scene_id(), scene);
        assert_eq!(address.time(), 12_345);
        assert_eq!(address.sequence(), 678);
        assert_eq!(scene.get(), 3017);
    }

    #[test]
    fn scene_root_is_distinct_from_entities() {
        let scene = SceneId::new(1, 1);
        let root = Address::for_scene(scene);

        assert!(root.is_scene_root());
        assert_eq!(root.scene_id(), scene);
        assert!(!Address::new(scene, 1, 0).is_scene_root());
        assert!(!Address::NONE.is_scene_root());
    }

    #[test]
    fn top_bit_stays_clear() {
        let address = Address::new(SceneId::new(255, 255), MAX_TIME, MAX_SEQUENCE);
        assert!(address.raw() > 0);
        assert_eq!(address.scene_id(), SceneId::new(255, 255));
    }

    #[test]
    fn scene_id_validation() {
        assert_eq!(SceneId::try_from(1001).unwrap(), SceneId::new(1, 1));
        assert!(SceneId::try_from(1300).is_err());
        assert!(SceneId::try_from(256_000).is_err());
    }
}
