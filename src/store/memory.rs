use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{Collection, Record};

use super::{Changeset, RecordStore};

/// Non-durable store for tests and embedding. Records every commit's
/// collection set and can be told to fail commits.
pub struct MemoryStore {
    collections: DashMap<Collection, Vec<u8>>,
    fail_commits: AtomicBool,
    commit_log: Mutex<Vec<Vec<Collection>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            fail_commits: AtomicBool::new(false),
            commit_log: Mutex::new(Vec::new()),
        }
    }

    /// Overwrite a collection with arbitrary bytes, bypassing the commit log.
    pub fn put_raw(&self, collection: Collection, bytes: Vec<u8>) {
        self.collections.insert(collection, bytes);
    }

    pub fn raw(&self, collection: Collection) -> Option<Vec<u8>> {
        self.collections.get(&collection).map(|e| e.value().clone())
    }

    pub fn seed<T: Record>(&self, items: &[T]) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(items)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.put_raw(T::COLLECTION, bytes);
        Ok(())
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Collections written by each successful commit, oldest first.
    pub fn commits(&self) -> Vec<Vec<Collection>> {
        self.commit_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn read(&self, collection: Collection) -> io::Result<Option<Vec<u8>>> {
        Ok(self.raw(collection))
    }

    async fn commit(&self, changes: Changeset) -> io::Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(io::Error::other("commit rejected by memory store"));
        }
        let written = changes.collections();
        for (collection, bytes) in changes.into_entries() {
            self.collections.insert(collection, bytes);
        }
        self.commit_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(written);
        Ok(())
    }

    async fn backup(&self) -> io::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::store::get;

    #[tokio::test]
    async fn failed_commit_changes_nothing() {
        let store = MemoryStore::new();
        store
            .seed(&[RoomType {
                room_type_id: 1,
                type_name: "Single".into(),
                price: 80.0,
            }])
            .unwrap();
        let before = store.raw(Collection::RoomTypes);

        store.set_fail_commits(true);
        let mut changes = Changeset::new();
        changes.save::<RoomType>(&[]).unwrap();
        assert!(store.commit(changes).await.is_err());
        assert_eq!(store.raw(Collection::RoomTypes), before);
        assert!(store.commits().is_empty());

        store.set_fail_commits(false);
        let mut changes = Changeset::new();
        changes.save::<RoomType>(&[]).unwrap();
        store.commit(changes).await.unwrap();
        assert!(get::<RoomType>(&store).await.unwrap().is_empty());
        assert_eq!(store.commits(), vec![vec![Collection::RoomTypes]]);
    }
}
