mod availability;
mod conflict;
mod error;
mod integrity;
mod mutations;
mod queries;

pub use availability::{
    available_rooms, find_conflict, has_active_bookings, is_room_available, overlaps, reconcile_statuses,
};
pub(crate) use conflict::validate_stay;
pub use error::EngineError;
pub use integrity::{
    next_id, validate_booking_exists, validate_guest_exists, validate_room_exists, validate_room_type_exists,
};

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::error;

use crate::model::*;
use crate::store::{self, Changeset, RecordStore};

/// Booking orchestrator over a [`RecordStore`].
///
/// Every mutation runs load -> check -> commit while holding `write_lock`, so
/// two requests can never both read the same snapshot and both write it back.
/// Queries read whatever was last committed and take no lock.
pub struct Engine {
    store: Arc<dyn RecordStore>,
    write_lock: Mutex<()>,
}

impl Engine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub(super) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    pub(super) async fn load<T: Record>(&self) -> Result<Vec<T>, EngineError> {
        Ok(store::get::<T>(self.store.as_ref()).await?)
    }

    /// Commit a changeset, logging failures. On `Storage` nothing is visible;
    /// on `Unpublished` the change is decided and recovery completes it.
    pub(super) async fn commit(&self, changes: Changeset) -> Result<(), EngineError> {
        let collections = changes.collections();
        self.store.commit(changes).await.map_err(|e| {
            error!("commit of {collections:?} failed: {e}");
            if store::is_unpublished(&e) {
                EngineError::Unpublished(e.to_string())
            } else {
                EngineError::Storage(e.to_string())
            }
        })
    }

    /// Stage and commit a single collection.
    pub(super) async fn save<T: Record>(&self, items: &[T]) -> Result<(), EngineError> {
        let mut changes = Changeset::new();
        changes.save(items)?;
        self.commit(changes).await
    }
}

/// Take the record with `id` out of a loaded collection.
pub(super) fn find<T: Record>(items: Vec<T>, id: Id) -> Result<T, EngineError> {
    items
        .into_iter()
        .find(|item| item.id() == id)
        .ok_or(EngineError::NotFound {
            collection: T::COLLECTION,
            id,
        })
}

pub(super) fn not_found<T: Record>(id: Id) -> EngineError {
    EngineError::NotFound {
        collection: T::COLLECTION,
        id,
    }
}
