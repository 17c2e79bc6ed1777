//! Address-to-entity table of one scene.
//!
//! Read on every routed frame and written on entity creation or removal, so it is kept as an
//! immutable snapshot swapped with `ArcSwap::rcu`. Every insertion gets a fresh generation;
//! continuations compare generations after a suspension to detect that the entity they
//! started with was removed or replaced.

use crate::address::Address;
use crate::registry::short_name;
use arc_swap::ArcSwap;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type EntityValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
pub struct EntityEntry {
    pub address: Address,
    pub generation: u64,
    pub type_name: &'static str,
    value: EntityValue,
}

impl EntityEntry {
    pub(crate) fn new(address: Address, generation: u64, type_name: &'static str, value: EntityValue) -> Self {
        Self {
            address,
            generation,
            type_name,
            value,
        }
    }

    pub fn downcast<E: Any + Send + Sync>(&self) -> Option<Arc<E>> {
        Arc::clone(&self.value).downcast::<E>().ok()
    }

    pub fn is<E: Any>(&self) -> bool {
        self.value.is::<E>()
    }
}

impl std::fmt::Debug for EntityEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityEntry")
            .field("address", &self.address)
            .field("generation", &self.generation)
            .field("type_name", &self.type_name)
            .finish()
    }
}

pub struct EntityTable {
    entries: ArcSwap<HashMap<Address, EntityEntry>>,
    next_generation: AtomicU64,
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTable {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Binds `entity` to `address`, replacing any previous binding. Returns the generation.
    pub fn insert<E: Any + Send + Sync>(&self, address: Address, entity: Arc<E>) -> u64 {
        self.insert_value(address, short_name::<E>(), entity)
    }

    pub(crate) fn insert_value(&self, address: Address, type_name: &'static str, value: EntityValue) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let entry = EntityEntry::new(address, generation, type_name, value);
        self.entries.rcu(|entries| {
            let mut next = HashMap::clone(entries);
            next.insert(address, entry.clone());
            next
        });
        generation
    }

    pub fn remove(&self, address: Address) -> Option<EntityEntry> {
        let previous = self.entries.rcu(|entries| {
            let mut next = HashMap::clone(entries);
            next.remove(&address);
            next
        });
        previous.get(&address).cloned()
    }

    pub fn get(&self, address: Address) -> Option<EntityEntry> {
        self.entries.load().get(&address).cloned()
    }

    /// True while `address` is still bound to the entry of `generation`.
    pub fn is_current(&self, address: Address, generation: u64) -> bool {
        self.entries
            .load()
            .get(&address)
            .is_some_and(|entry| entry.generation == generation)
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.entries.store(Arc::new(HashMap::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SceneId;

    struct Player {
        name: &'static str,
    }

    #[test]
    fn generations_detect_replacement() {
        let table = EntityTable::new();
        let address = Address::new(SceneId::new(1, 1), 1, 1);

        let first = table.insert(address, Arc::new(Player { name: "a" }));
        assert!(table.is_current(address, first));

        let second = table.insert(address, Arc::new(Player { name: "b" }));
        assert!(!table.is_current(address, first));
        assert!(table.is_current(address, second));
        assert_eq!(table.get(address).unwrap().downcast::<Player>().unwrap().name, "b");

        assert!(table.remove(address).is_some());
        assert!(!table.is_current(address, second));
        assert!(table.remove(address).is_none());
    }

    #[test]
    fn downcast_checks_type() {
        let table = EntityTable::new();
        let address = Address::new(SceneId::new(1, 1), 1, 2);
        table.insert(address, Arc::new(Player { name: "a" }));

        let entry = table.get(address).unwrap();
        assert!(entry.is::<Player>());
        assert!(entry.downcast::<String>().is_none());
        assert_eq!(entry.type_name, "Player");
    }
}
