//! Document store contract.
//!
//! The remote document database is an external collaborator: this module
//! defines the contract the rest of the crate consumes, and nothing else.
//! A store is a hierarchy of collections addressed by slash-separated
//! paths (`trips/{tripId}/checklist/{id}`), offering CRUD operations,
//! atomic batched writes, and push-style subscriptions that deliver whole
//! snapshots.
//!
//! Two implementations ship with the crate: [`crate::memory::MemoryStore`]
//! (always available) and, behind cargo features, a SQLite-backed and a
//! REST-backed store.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TripPlanError};

/// Field map of a schema-less document body.
pub type Fields = Map<String, Value>;

/// A document snapshot: the store-assigned key plus the field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

// ============================================================================
// Paths
// ============================================================================
//
// Paths alternate collection and document segments, so a document path has
// an even number of segments and a collection path an odd number:
//   trips                                 -> collection
//   trips/{tripId}                        -> document
//   trips/{tripId}/checklist              -> collection
//   trips/{tripId}/checklist/{id}         -> document

fn segments(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() {
        return Err(TripPlanError::InvalidPath {
            path: path.to_string(),
            message: "path is empty".to_string(),
        });
    }
    let parts: Vec<&str> = path.split('/').collect();
    if parts.iter().any(|s| s.is_empty()) {
        return Err(TripPlanError::InvalidPath {
            path: path.to_string(),
            message: "path has an empty segment".to_string(),
        });
    }
    Ok(parts)
}

/// Validate a document path (even number of segments).
pub fn ensure_document_path(path: &str) -> Result<()> {
    let parts = segments(path)?;
    if parts.len() % 2 != 0 {
        return Err(TripPlanError::InvalidPath {
            path: path.to_string(),
            message: "expected a document path, got a collection path".to_string(),
        });
    }
    Ok(())
}

/// Validate a collection path (odd number of segments).
pub fn ensure_collection_path(path: &str) -> Result<()> {
    let parts = segments(path)?;
    if parts.len() % 2 == 0 {
        return Err(TripPlanError::InvalidPath {
            path: path.to_string(),
            message: "expected a collection path, got a document path".to_string(),
        });
    }
    Ok(())
}

/// The id (final segment) of a document path.
pub fn document_id(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// The collection a document path belongs to (everything before the id).
pub fn parent_collection(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Join a collection path and a document id.
pub fn child_path(collection: &str, id: &str) -> String {
    format!("{}/{}", collection, id)
}

// ============================================================================
// Batched writes
// ============================================================================

/// A single write inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WriteOp {
    /// Create or replace the document at `path`.
    Set { path: String, data: Fields },
    /// Merge `fields` into the existing document at `path`; the batch
    /// fails if the document does not exist.
    Update { path: String, fields: Fields },
    /// Delete the document at `path` (no-op if absent).
    Delete { path: String },
}

impl WriteOp {
    /// The document path this operation touches.
    pub fn path(&self) -> &str {
        match self {
            WriteOp::Set { path, .. } => path,
            WriteOp::Update { path, .. } => path,
            WriteOp::Delete { path } => path,
        }
    }
}

/// A condition the store checks atomically before applying a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Precondition {
    /// The named collection must contain no documents.
    CollectionEmpty { path: String },
}

/// An ordered set of writes applied atomically.
///
/// Preconditions are checked first; if any fails, nothing is written and
/// the commit returns [`TripPlanError::PreconditionFailed`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
    preconditions: Vec<Precondition>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a create-or-replace write.
    pub fn set(&mut self, path: impl Into<String>, data: Fields) {
        self.ops.push(WriteOp::Set {
            path: path.into(),
            data,
        });
    }

    /// Queue a partial merge write.
    pub fn update(&mut self, path: impl Into<String>, fields: Fields) {
        self.ops.push(WriteOp::Update {
            path: path.into(),
            fields,
        });
    }

    /// Queue a delete.
    pub fn delete(&mut self, path: impl Into<String>) {
        self.ops.push(WriteOp::Delete { path: path.into() });
    }

    /// Require the named collection to be empty at commit time.
    pub fn require_collection_empty(&mut self, path: impl Into<String>) {
        self.preconditions
            .push(Precondition::CollectionEmpty { path: path.into() });
    }

    /// Queued operations, in commit order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Preconditions checked before any write is applied.
    pub fn preconditions(&self) -> &[Precondition] {
        &self.preconditions
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when no operations are queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

/// Callback for single-document subscriptions (`None` when absent).
pub type DocumentCallback = Arc<dyn Fn(Option<Document>) + Send + Sync>;

/// Callback for collection subscriptions; snapshots arrive wholesale.
pub type CollectionCallback = Arc<dyn Fn(Vec<Document>) + Send + Sync>;

/// Cancellation handle for a live subscription.
///
/// The subscription is torn down when the handle is cancelled or dropped,
/// whichever comes first.
pub struct WatchHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchHandle {
    /// Wrap an unregister action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle whose cancellation does nothing.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Tear the subscription down now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ============================================================================
// Store contract
// ============================================================================

/// The document store contract.
///
/// Implementations must deliver an initial snapshot synchronously when a
/// watch is registered, then one notification per observed change, in
/// commit order per target. Callbacks are invoked with no internal store
/// locks held, so a callback may re-enter the store.
pub trait DocumentStore: Send + Sync {
    /// Produce a fresh store-assigned document key without writing.
    ///
    /// Needed to build batches whose operations reference documents that
    /// do not exist yet (seeding writes locations under a route created
    /// in the same batch).
    fn allocate_id(&self) -> String;

    /// Read one document.
    fn get_document(&self, path: &str) -> Result<Option<Document>>;

    /// Read a whole collection. Snapshot order is ascending document id.
    fn list_documents(&self, collection: &str) -> Result<Vec<Document>>;

    /// Create or replace a document.
    fn set_document(&self, path: &str, data: Fields) -> Result<()>;

    /// Merge fields into an existing document; [`TripPlanError::NotFound`]
    /// if it does not exist.
    fn update_document(&self, path: &str, fields: Fields) -> Result<()>;

    /// Delete a document. Deleting an absent document is not an error.
    fn delete_document(&self, path: &str) -> Result<()>;

    /// Create a document with a fresh key, returning the key.
    fn add_document(&self, collection: &str, data: Fields) -> Result<String>;

    /// Apply a batch atomically.
    fn commit_batch(&self, batch: WriteBatch) -> Result<()>;

    /// Subscribe to one document.
    fn watch_document(&self, path: &str, callback: DocumentCallback) -> Result<WatchHandle>;

    /// Subscribe to a collection.
    fn watch_collection(&self, collection: &str, callback: CollectionCallback)
        -> Result<WatchHandle>;
}

// ============================================================================
// Document <-> typed entity helpers
// ============================================================================

/// Serialize an entity into a document field map.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(TripPlanError::Parse {
            message: format!("expected a JSON object, got {}", other),
        }),
        Err(e) => Err(TripPlanError::Parse {
            message: e.to_string(),
        }),
    }
}

/// Deserialize a document body into an entity.
pub fn from_fields<T: DeserializeOwned>(data: &Fields) -> Result<T> {
    serde_json::from_value(Value::Object(data.clone())).map_err(|e| TripPlanError::Parse {
        message: e.to_string(),
    })
}
