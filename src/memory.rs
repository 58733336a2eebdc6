//! In-memory document store.
//!
//! `MemoryStore` implements the full [`DocumentStore`] contract against a
//! flat path-keyed map. It backs the unit tests, demos, and offline use;
//! the semantics (id-ordered snapshots, atomic batches, synchronous
//! notification delivery) are the reference behavior the other backends
//! follow.
//!
//! Lock discipline: callbacks are always invoked after the internal locks
//! are released, and snapshots are read fresh per delivery, so a callback
//! may freely mutate the store or register further watchers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use uuid::Uuid;

use crate::error::{Result, TripPlanError};
use crate::store::{
    child_path, ensure_collection_path, ensure_document_path, parent_collection,
    CollectionCallback, Document, DocumentCallback, DocumentStore, Fields, Precondition,
    WatchHandle, WriteBatch, WriteOp,
};

/// In-memory implementation of the document store contract.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    documents: Mutex<BTreeMap<String, Fields>>,
    watchers: WatcherSet,
}

// ============================================================================
// Watcher registry (shared with the other embedded backends)
// ============================================================================

enum Watcher {
    Document {
        id: u64,
        path: String,
        callback: DocumentCallback,
    },
    Collection {
        id: u64,
        path: String,
        callback: CollectionCallback,
    },
}

impl Watcher {
    fn id(&self) -> u64 {
        match self {
            Watcher::Document { id, .. } => *id,
            Watcher::Collection { id, .. } => *id,
        }
    }
}

/// A notification ready to be delivered once locks are released.
pub(crate) enum Delivery {
    Document(String, DocumentCallback),
    Collection(String, CollectionCallback),
}

/// Process-local watcher registry used by the embedded stores.
#[derive(Default)]
pub(crate) struct WatcherSet {
    watchers: Mutex<Vec<Watcher>>,
    next_id: AtomicU64,
}

impl WatcherSet {
    pub(crate) fn register_document(&self, path: &str, callback: DocumentCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.watchers.lock().unwrap().push(Watcher::Document {
            id,
            path: path.to_string(),
            callback,
        });
        id
    }

    pub(crate) fn register_collection(&self, path: &str, callback: CollectionCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.watchers.lock().unwrap().push(Watcher::Collection {
            id,
            path: path.to_string(),
            callback,
        });
        id
    }

    pub(crate) fn unregister(&self, watcher_id: u64) {
        self.watchers.lock().unwrap().retain(|w| w.id() != watcher_id);
    }

    /// Deliveries owed for a set of touched document paths.
    pub(crate) fn deliveries_for(&self, affected: &BTreeSet<String>) -> Vec<Delivery> {
        let watchers = self.watchers.lock().unwrap();
        watchers
            .iter()
            .filter_map(|watcher| match watcher {
                Watcher::Document { path, callback, .. } if affected.contains(path) => {
                    Some(Delivery::Document(path.clone(), Arc::clone(callback)))
                }
                Watcher::Collection { path, callback, .. }
                    if affected.iter().any(|p| parent_collection(p) == path) =>
                {
                    Some(Delivery::Collection(path.clone(), Arc::clone(callback)))
                }
                _ => None,
            })
            .collect()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of documents across all collections.
    pub fn document_count(&self) -> usize {
        self.inner.documents.lock().unwrap().len()
    }

    fn read_document(&self, path: &str) -> Option<Document> {
        let documents = self.inner.documents.lock().unwrap();
        documents.get(path).map(|data| Document {
            id: crate::store::document_id(path).to_string(),
            data: data.clone(),
        })
    }

    fn read_collection(&self, collection: &str) -> Vec<Document> {
        let documents = self.inner.documents.lock().unwrap();
        collection_members(&documents, collection)
    }

    /// Apply a batch atomically, returning the touched document paths.
    fn apply(&self, batch: &WriteBatch) -> Result<BTreeSet<String>> {
        for op in batch.ops() {
            ensure_document_path(op.path())?;
        }
        for pre in batch.preconditions() {
            let Precondition::CollectionEmpty { path } = pre;
            ensure_collection_path(path)?;
        }

        let mut affected = BTreeSet::new();
        {
            let mut documents = self.inner.documents.lock().unwrap();

            for pre in batch.preconditions() {
                let Precondition::CollectionEmpty { path } = pre;
                if !collection_members(&documents, path).is_empty() {
                    return Err(TripPlanError::PreconditionFailed {
                        message: format!("collection '{}' is not empty", path),
                    });
                }
            }

            // Stage the writes on a copy so a failing update leaves the
            // store untouched.
            let mut staged = documents.clone();
            for op in batch.ops() {
                match op {
                    WriteOp::Set { path, data } => {
                        staged.insert(path.clone(), data.clone());
                    }
                    WriteOp::Update { path, fields } => {
                        let existing =
                            staged.get_mut(path).ok_or_else(|| TripPlanError::NotFound {
                                path: path.clone(),
                            })?;
                        for (key, value) in fields {
                            existing.insert(key.clone(), value.clone());
                        }
                    }
                    WriteOp::Delete { path } => {
                        staged.remove(path);
                    }
                }
                affected.insert(op.path().to_string());
            }
            *documents = staged;
        }
        Ok(affected)
    }

    /// Deliver notifications for the touched paths.
    ///
    /// Snapshots are read at delivery time, not commit time, so callbacks
    /// that mutate the store never leave later deliveries stale.
    fn notify(&self, affected: &BTreeSet<String>) {
        for delivery in self.inner.watchers.deliveries_for(affected) {
            match delivery {
                Delivery::Document(path, callback) => callback(self.read_document(&path)),
                Delivery::Collection(path, callback) => callback(self.read_collection(&path)),
            }
        }
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let affected = self.apply(&batch)?;
        self.notify(&affected);
        Ok(())
    }
}

/// Documents directly inside `collection`, in ascending id order.
fn collection_members(documents: &BTreeMap<String, Fields>, collection: &str) -> Vec<Document> {
    let prefix = format!("{}/", collection);
    documents
        .range(prefix.clone()..)
        .take_while(|(path, _)| path.starts_with(&prefix))
        .filter(|(path, _)| !path[prefix.len()..].contains('/'))
        .map(|(path, data)| Document {
            id: path[prefix.len()..].to_string(),
            data: data.clone(),
        })
        .collect()
}

impl DocumentStore for MemoryStore {
    fn allocate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn get_document(&self, path: &str) -> Result<Option<Document>> {
        ensure_document_path(path)?;
        Ok(self.read_document(path))
    }

    fn list_documents(&self, collection: &str) -> Result<Vec<Document>> {
        ensure_collection_path(collection)?;
        Ok(self.read_collection(collection))
    }

    fn set_document(&self, path: &str, data: Fields) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.set(path, data);
        self.commit(batch)
    }

    fn update_document(&self, path: &str, fields: Fields) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.update(path, fields);
        self.commit(batch)
    }

    fn delete_document(&self, path: &str) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(path);
        self.commit(batch)
    }

    fn add_document(&self, collection: &str, data: Fields) -> Result<String> {
        ensure_collection_path(collection)?;
        let id = self.allocate_id();
        self.set_document(&child_path(collection, &id), data)?;
        Ok(id)
    }

    fn commit_batch(&self, batch: WriteBatch) -> Result<()> {
        self.commit(batch)
    }

    fn watch_document(&self, path: &str, callback: DocumentCallback) -> Result<WatchHandle> {
        ensure_document_path(path)?;
        let id = self
            .inner
            .watchers
            .register_document(path, Arc::clone(&callback));
        debug!("[MemoryStore] watch document '{}' (#{})", path, id);

        // Initial snapshot, delivered with no locks held.
        callback(self.read_document(path));

        let inner = Arc::clone(&self.inner);
        Ok(WatchHandle::new(move || {
            inner.watchers.unregister(id);
        }))
    }

    fn watch_collection(
        &self,
        collection: &str,
        callback: CollectionCallback,
    ) -> Result<WatchHandle> {
        ensure_collection_path(collection)?;
        let id = self
            .inner
            .watchers
            .register_collection(collection, Arc::clone(&callback));
        debug!("[MemoryStore] watch collection '{}' (#{})", collection, id);

        callback(self.read_collection(collection));

        let inner = Arc::clone(&self.inner);
        Ok(WatchHandle::new(move || {
            inner.watchers.unregister(id);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_set_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .set_document("trips/demo", fields(json!({"name": "Demo"})))
            .unwrap();

        let doc = store.get_document("trips/demo").unwrap().unwrap();
        assert_eq!(doc.id, "demo");
        assert_eq!(doc.data["name"], "Demo");

        assert!(store.get_document("trips/other").unwrap().is_none());
    }

    #[test]
    fn test_update_merges_and_requires_existence() {
        let store = MemoryStore::new();
        store
            .set_document("trips/demo", fields(json!({"name": "Demo", "participants": 2})))
            .unwrap();
        store
            .update_document("trips/demo", fields(json!({"participants": 3})))
            .unwrap();

        let doc = store.get_document("trips/demo").unwrap().unwrap();
        assert_eq!(doc.data["name"], "Demo");
        assert_eq!(doc.data["participants"], 3);

        let err = store
            .update_document("trips/missing", fields(json!({"a": 1})))
            .unwrap_err();
        assert!(matches!(err, TripPlanError::NotFound { .. }));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .set_document("trips/demo", fields(json!({"name": "Demo"})))
            .unwrap();
        store.delete_document("trips/demo").unwrap();
        store.delete_document("trips/demo").unwrap();
        assert!(store.get_document("trips/demo").unwrap().is_none());
    }

    #[test]
    fn test_list_is_scoped_and_id_ordered() {
        let store = MemoryStore::new();
        store
            .set_document("trips/demo/checklist/b", fields(json!({"text": "B"})))
            .unwrap();
        store
            .set_document("trips/demo/checklist/a", fields(json!({"text": "A"})))
            .unwrap();
        // A nested subcollection document must not leak into the parent
        // collection listing.
        store
            .set_document("trips/demo/routes/r1/locations/x", fields(json!({"name": "X"})))
            .unwrap();

        let docs = store.list_documents("trips/demo/checklist").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "a");
        assert_eq!(docs[1].id, "b");

        let routes = store.list_documents("trips/demo/routes").unwrap();
        assert!(routes.is_empty());
    }

    #[test]
    fn test_add_document_allocates_ids() {
        let store = MemoryStore::new();
        let id1 = store
            .add_document("trips/demo/checklist", fields(json!({"text": "one"})))
            .unwrap();
        let id2 = store
            .add_document("trips/demo/checklist", fields(json!({"text": "two"})))
            .unwrap();
        assert_ne!(id1, id2);
        assert_eq!(store.list_documents("trips/demo/checklist").unwrap().len(), 2);
    }

    #[test]
    fn test_batch_is_atomic() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.set("trips/demo", fields(json!({"name": "Demo"})));
        // Updating a missing document fails the whole batch.
        batch.update("trips/other", fields(json!({"name": "Other"})));

        let err = store.commit_batch(batch).unwrap_err();
        assert!(matches!(err, TripPlanError::NotFound { .. }));
        assert!(store.get_document("trips/demo").unwrap().is_none());
    }

    #[test]
    fn test_batch_precondition_collection_empty() {
        let store = MemoryStore::new();
        store
            .set_document("trips/demo/routes/r1", fields(json!({"name": "R1"})))
            .unwrap();

        let mut batch = WriteBatch::new();
        batch.require_collection_empty("trips/demo/routes");
        batch.set("trips/demo/routes/r2", fields(json!({"name": "R2"})));

        let err = store.commit_batch(batch).unwrap_err();
        assert!(matches!(err, TripPlanError::PreconditionFailed { .. }));
        assert_eq!(store.list_documents("trips/demo/routes").unwrap().len(), 1);
    }

    #[test]
    fn test_watch_document_fires_immediately_and_on_change() {
        let store = MemoryStore::new();
        let seen: Arc<StdMutex<Vec<Option<Document>>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let handle = store
            .watch_document(
                "trips/demo",
                Arc::new(move |doc| sink.lock().unwrap().push(doc)),
            )
            .unwrap();

        store
            .set_document("trips/demo", fields(json!({"name": "Demo"})))
            .unwrap();

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert!(seen[0].is_none());
            assert!(seen[1].is_some());
        }

        handle.cancel();
        store
            .set_document("trips/demo", fields(json!({"name": "Changed"})))
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_watch_collection_sees_member_changes() {
        let store = MemoryStore::new();
        let counts: Arc<StdMutex<Vec<usize>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&counts);

        let _handle = store
            .watch_collection(
                "trips/demo/checklist",
                Arc::new(move |docs| sink.lock().unwrap().push(docs.len())),
            )
            .unwrap();

        store
            .add_document("trips/demo/checklist", fields(json!({"text": "one"})))
            .unwrap();
        store
            .add_document("trips/demo/checklist", fields(json!({"text": "two"})))
            .unwrap();
        // A write in a sibling collection must not notify this watcher.
        store
            .add_document("trips/demo/budget", fields(json!({"amount": 10})))
            .unwrap();

        assert_eq!(*counts.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_callback_may_reenter_the_store() {
        let store = MemoryStore::new();
        let inner = store.clone();

        // Mirrors the trip synchronizer's create-defaults-on-absent flow.
        let _handle = store
            .watch_document(
                "trips/demo",
                Arc::new(move |doc| {
                    if doc.is_none() {
                        inner
                            .set_document("trips/demo", fields(json!({"name": "Defaults"})))
                            .unwrap();
                    }
                }),
            )
            .unwrap();

        let doc = store.get_document("trips/demo").unwrap().unwrap();
        assert_eq!(doc.data["name"], "Defaults");
    }

    #[test]
    fn test_dropping_handle_unsubscribes() {
        let store = MemoryStore::new();
        let counts: Arc<StdMutex<usize>> = Arc::new(StdMutex::new(0));
        let sink = Arc::clone(&counts);

        {
            let _handle = store
                .watch_collection(
                    "trips/demo/checklist",
                    Arc::new(move |_| *sink.lock().unwrap() += 1),
                )
                .unwrap();
        }

        store
            .add_document("trips/demo/checklist", fields(json!({"text": "one"})))
            .unwrap();
        // Only the initial snapshot was delivered.
        assert_eq!(*counts.lock().unwrap(), 1);
    }
}
