//! Record store: one JSON array per collection behind the [`RecordStore`] trait.
//!
//! Reads are lenient: an absent, unparsable or non-array collection is an empty
//! collection. Writes go through a [`Changeset`] so that every collection touched
//! by one logical operation is committed together.

mod journal;
mod json;
mod memory;

pub use journal::{CommitRecord, Journal, JournalState};
pub use json::JsonStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use async_trait::async_trait;
use tracing::warn;
use ulid::Ulid;

use crate::model::{Collection, Record};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Raw contents of a collection, or `None` if it was never written.
    async fn read(&self, collection: Collection) -> io::Result<Option<Vec<u8>>>;

    /// Replace every collection in `changes`. Either all of them become visible,
    /// or none do and the error is plain I/O, or the commit was decided and the
    /// error is [`Unpublished`]: recovery will make all of them visible.
    async fn commit(&self, changes: Changeset) -> io::Result<()>;

    /// Copy every collection to backup storage. Returns the backup names written.
    async fn backup(&self) -> io::Result<Vec<String>>;
}

/// A journaled commit that is decided but not yet fully in place. Recovery
/// publishes it; until then some of its files may still hold old contents.
#[derive(Debug)]
pub struct Unpublished {
    pub commit: Ulid,
    pub files: Vec<String>,
    pub cause: io::Error,
}

impl Unpublished {
    pub fn into_io(self) -> io::Error {
        io::Error::other(self)
    }
}

impl fmt::Display for Unpublished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "commit {} of {:?} is recorded but not yet published: {}",
            self.commit, self.files, self.cause
        )
    }
}

impl std::error::Error for Unpublished {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// True when a commit failed after it was decided; see [`Unpublished`].
pub fn is_unpublished(e: &io::Error) -> bool {
    e.get_ref().is_some_and(|inner| inner.is::<Unpublished>())
}

/// Load a typed collection. Never fails on bad content, only on I/O.
pub async fn get<T: Record>(store: &dyn RecordStore) -> io::Result<Vec<T>> {
    match store.read(T::COLLECTION).await? {
        Some(bytes) => Ok(decode(T::COLLECTION, &bytes)),
        None => Ok(Vec::new()),
    }
}

fn decode<T: Record>(collection: Collection, bytes: &[u8]) -> Vec<T> {
    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => {
            warn!("invalid JSON in {collection}, treating as empty: {e}");
            return Vec::new();
        }
    };
    if !value.is_array() {
        warn!("invalid data format in {collection}: expected array");
        return Vec::new();
    }
    match serde_json::from_value(value) {
        Ok(items) => items,
        Err(e) => {
            warn!("unreadable records in {collection}, treating as empty: {e}");
            Vec::new()
        }
    }
}

/// Collections staged for one commit, serialized and keyed by collection.
#[derive(Debug, Default)]
pub struct Changeset {
    entries: BTreeMap<Collection, Vec<u8>>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the full new contents of `T`'s collection.
    pub fn save<T: Record>(&mut self, items: &[T]) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(items)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.entries.insert(T::COLLECTION, bytes);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.entries.keys().copied().collect()
    }

    pub fn into_entries(self) -> Vec<(Collection, Vec<u8>)> {
        self.entries.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;

    #[tokio::test]
    async fn absent_collection_is_empty() {
        let store = MemoryStore::new();
        let guests: Vec<Guest> = get(&store).await.unwrap();
        assert!(guests.is_empty());
    }

    #[tokio::test]
    async fn corrupt_collection_is_empty() {
        let store = MemoryStore::new();
        store.put_raw(Collection::Rooms, b"{not json".to_vec());
        let rooms: Vec<Room> = get(&store).await.unwrap();
        assert!(rooms.is_empty());

        store.put_raw(Collection::Rooms, br#"{"room_id": 1}"#.to_vec());
        let rooms: Vec<Room> = get(&store).await.unwrap();
        assert!(rooms.is_empty());
    }

    #[tokio::test]
    async fn changeset_round_trips_through_store() {
        let store = MemoryStore::new();
        let types = vec![RoomType {
            room_type_id: 1,
            type_name: "Suite".into(),
            price: 250.0,
        }];
        let mut changes = Changeset::new();
        changes.save(&types).unwrap();
        assert_eq!(changes.collections(), vec![Collection::RoomTypes]);
        store.commit(changes).await.unwrap();

        let loaded: Vec<RoomType> = get(&store).await.unwrap();
        assert_eq!(loaded, types);
    }

    #[test]
    fn changeset_is_pretty_json() {
        let mut changes = Changeset::new();
        changes
            .save(&[Guest {
                guest_id: 1,
                full_name: "Ada".into(),
                phone: String::new(),
                email: String::new(),
                address: "1 Loop Rd".into(),
            }])
            .unwrap();
        let entries = changes.into_entries();
        let text = String::from_utf8(entries[0].1.clone()).unwrap();
        assert!(text.starts_with("[\n  {\n    \"guest_id\": 1"));
    }
}
