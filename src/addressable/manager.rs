//! # AddressableManager
//!
//! The directory half living on a directory scene: maps a stable `i64` key to the address
//! currently owning it.
//!
//! Every operation runs under the key's [`CoroutineLock`]. [`AddressableManager::lock`] keeps
//! the guard inside the record, so while an entity migrates every `get` for its key queues
//! until [`AddressableManager::unlock`] publishes the new owner.

use super::AddressableError;
use crate::address::{Address, SceneId};
use crate::lock::{CoroutineLock, LockGuard};
use crate::scene::Scene;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

#[derive(Default)]
struct Record {
    owner: Option<Address>,
    held: Option<LockGuard<i64>>,
}

pub struct AddressableManager {
    scene: SceneId,
    records: Mutex<HashMap<i64, Record>>,
    lock: CoroutineLock<i64>,
}

impl AddressableManager {
    pub fn new(scene: &Scene) -> Self {
        Self {
            scene: scene.id(),
            records: Mutex::new(HashMap::new()),
            lock: scene.new_lock("addressable"),
        }
    }

    /// The manager attached to `scene`, created on first use.
    pub fn of(scene: &Scene) -> std::sync::Arc<Self> {
        scene.component_or_insert_with(|| Self::new(scene))
    }

    fn records(&self) -> MutexGuard<'_, HashMap<i64, Record>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn acquire(&self, key: i64) -> Result<LockGuard<i64>, AddressableError> {
        self.lock
            .wait(key)
            .await
            .map_err(|source| AddressableError::Lock { key, source })
    }

    /// Records `owner` for `key`. With `lock`, the key stays locked until [`Self::unlock`].
    pub async fn add(&self, key: i64, owner: Address, lock: bool) -> Result<(), AddressableError> {
        let guard = self.acquire(key).await?;
        let mut records = self.records();
        let record = records.entry(key).or_default();
        record.owner = Some(owner);
        if lock {
            record.held = Some(guard);
        }
        info!(scene = %self.scene, key, %owner, lock, "Addressable added");
        Ok(())
    }

    /// The current owner of `key`. Queues behind a held lock.
    pub async fn get(&self, key: i64) -> Result<Address, AddressableError> {
        let _guard = self.acquire(key).await?;
        self.records()
            .get(&key)
            .and_then(|record| record.owner)
            .ok_or(AddressableError::NotFound(key))
    }

    pub async fn remove(&self, key: i64) -> Result<(), AddressableError> {
        let _guard = self.acquire(key).await?;
        let removed = self.records().remove(&key);
        debug!(scene = %self.scene, key, found = removed.is_some(), "Addressable removed");
        Ok(())
    }

    /// Takes the key's lock and keeps it until [`Self::unlock`].
    pub async fn lock(&self, key: i64) -> Result<(), AddressableError> {
        let guard = self.acquire(key).await?;
        self.records().entry(key).or_default().held = Some(guard);
        debug!(scene = %self.scene, key, "Addressable locked");
        Ok(())
    }

    /// Publishes `owner` as the new owner of a locked key and releases the lock.
    pub fn unlock(&self, key: i64, owner: Address, source: &str) -> Result<(), AddressableError> {
        let guard = {
            let mut records = self.records();
            let Some(record) = records.get_mut(&key) else {
                error!(scene = %self.scene, key, source, "Unlock of unknown addressable");
                return Err(AddressableError::NotLocked(key));
            };
            let Some(guard) = record.held.take() else {
                error!(scene = %self.scene, key, source, "Unlock of addressable that is not locked");
                return Err(AddressableError::NotLocked(key));
            };
            if !owner.is_none() {
                record.owner = Some(owner);
            }
            guard
        };
        guard.release();
        info!(scene = %self.scene, key, %owner, source, "Addressable unlocked");
        Ok(())
    }

    pub fn is_locked(&self, key: i64) -> bool {
        self.records().get(&key).is_some_and(|record| record.held.is_some())
    }

    pub fn len(&self) -> usize {
        self.records().values().filter(|record| record.owner.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::runtime::Process;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn add_with_lock_holds_the_key_until_unlock() {
        let process = Process::new("directory", RuntimeConfig::default()).unwrap();
        let scene = process.create_scene(SceneId::new(1, 1)).unwrap();
        let manager = AddressableManager::of(&scene);
        let first = scene.new_address();
        let second = scene.new_address();

        manager.add(3, first, true).await.unwrap();
        assert!(manager.is_locked(3));

        let lookup = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get(3).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!lookup.is_finished());

        manager.unlock(3, second, "test").unwrap();
        assert_eq!(lookup.await.unwrap().unwrap(), second);
        assert!(!manager.is_locked(3));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn unlock_with_empty_owner_keeps_the_old_one() {
        let process = Process::new("directory", RuntimeConfig::default()).unwrap();
        let scene = process.create_scene(SceneId::new(1, 1)).unwrap();
        let manager = AddressableManager::of(&scene);
        let owner = scene.new_address();

        manager.add(8, owner, false).await.unwrap();
        manager.lock(8).await.unwrap();
        manager.unlock(8, Address::NONE, "test").unwrap();
        assert_eq!(manager.get(8).await.unwrap(), owner);

        manager.remove(8).await.unwrap();
        assert!(manager.is_empty());
        assert!(matches!(manager.unlock(8, owner, "test"), Err(AddressableError::NotLocked(8))));
    }
}
