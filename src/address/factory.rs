//! Address allocation for one scene.

use super::{Address, SceneId, MAX_SEQUENCE, MAX_TIME};
use std::sync::Mutex;
use std::time::Instant;

/// Allocates unique entity addresses for a single scene.
///
/// The time field counts seconds since the factory was created (starting at 1), and the
/// sequence restarts whenever the time advances. If a second's sequence space runs out the
/// factory borrows the next second.
///
/// The field holds 23 bits, so it cycles back to 1 after `MAX_TIME` seconds (about 97
/// days). Addresses stay unique within one cycle; an entity still alive a full cycle after
/// its creation may see its address handed out again.
pub struct AddressFactory {
    scene: SceneId,
    epoch: Instant,
    state: Mutex<FactoryState>,
}

struct FactoryState {
    /// Seconds since the epoch plus one, never masked.
    second: u64,
    sequence: u32,
}

/// Maps an unmasked second onto the 1..=MAX_TIME range of the time field.
fn time_field(second: u64) -> u32 {
    (second.saturating_sub(1) % u64::from(MAX_TIME)) as u32 + 1
}

impl AddressFactory {
    pub fn new(scene: SceneId) -> Self {
        Self {
            scene,
            epoch: Instant::now(),
            state: Mutex::new(FactoryState { second: 0, sequence: 0 }),
        }
    }

    pub fn scene(&self) -> SceneId {
        self.scene
    }

    /// Returns a fresh address owned by this factory's scene.
    pub fn create(&self) -> Address {
        self.allocate(self.epoch.elapsed().as_secs())
    }

    fn allocate(&self, elapsed_secs: u64) -> Address {
        let now = elapsed_secs + 1;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if now > state.second {
            state.second = now;
            state.sequence = 0;
        } else if state.sequence >= MAX_SEQUENCE {
            state.second += 1;
            state.sequence = 0;
        }

        state.sequence += 1;
        Address::new(self.scene, time_field(state.second), state.sequence)
    }
}
