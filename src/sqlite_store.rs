//! SQLite-backed document store.
//!
//! Persists the same path-keyed document model as the in-memory store in
//! a single `documents` table, one JSON body per row. Watcher bookkeeping
//! and notification semantics are identical to [`crate::MemoryStore`]:
//! subscriptions are process-local, snapshots are read fresh per delivery,
//! and callbacks run with no locks held.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Result, TripPlanError};
use crate::memory::{Delivery, WatcherSet};
use crate::store::{
    child_path, document_id, ensure_collection_path, ensure_document_path, parent_collection,
    CollectionCallback, Document, DocumentCallback, DocumentStore, Fields, Precondition,
    WatchHandle, WriteBatch, WriteOp,
};

/// SQLite implementation of the document store contract.
pub struct SqliteStore {
    inner: Arc<SqliteInner>,
}

struct SqliteInner {
    conn: Mutex<Connection>,
    watchers: WatcherSet,
}

fn sql_err(e: rusqlite::Error) -> TripPlanError {
    TripPlanError::Store {
        message: e.to_string(),
    }
}

fn json_err(e: serde_json::Error) -> TripPlanError {
    TripPlanError::Store {
        message: format!("corrupt document body: {}", e),
    }
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(sql_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (tests, ephemeral sessions).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            inner: Arc::new(SqliteInner {
                conn: Mutex::new(conn),
                watchers: WatcherSet::default(),
            }),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection
                ON documents(collection);",
        )
        .map_err(sql_err)
    }

    fn read_document(&self, path: &str) -> Result<Option<Document>> {
        let conn = self.inner.conn.lock().unwrap();
        let body: Option<String> = conn
            .query_row(
                "SELECT data FROM documents WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;

        match body {
            Some(body) => {
                let data: Fields = serde_json::from_str(&body).map_err(json_err)?;
                Ok(Some(Document {
                    id: document_id(path).to_string(),
                    data,
                }))
            }
            None => Ok(None),
        }
    }

    fn read_collection(&self, collection: &str) -> Result<Vec<Document>> {
        let conn = self.inner.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT path, data FROM documents
                 WHERE collection = ?1 ORDER BY path",
            )
            .map_err(sql_err)?;

        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(sql_err)?;

        let mut docs = Vec::new();
        for row in rows {
            let (path, body) = row.map_err(sql_err)?;
            let data: Fields = serde_json::from_str(&body).map_err(json_err)?;
            docs.push(Document {
                id: document_id(&path).to_string(),
                data,
            });
        }
        Ok(docs)
    }

    /// Apply a batch inside one transaction, returning the touched paths.
    fn apply(&self, batch: &WriteBatch) -> Result<BTreeSet<String>> {
        for op in batch.ops() {
            ensure_document_path(op.path())?;
        }
        for pre in batch.preconditions() {
            let Precondition::CollectionEmpty { path } = pre;
            ensure_collection_path(path)?;
        }

        let mut affected = BTreeSet::new();
        let mut conn = self.inner.conn.lock().unwrap();
        let tx = conn.transaction().map_err(sql_err)?;

        for pre in batch.preconditions() {
            let Precondition::CollectionEmpty { path } = pre;
            let count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                    params![path],
                    |row| row.get(0),
                )
                .map_err(sql_err)?;
            if count > 0 {
                return Err(TripPlanError::PreconditionFailed {
                    message: format!("collection '{}' is not empty", path),
                });
            }
        }

        for op in batch.ops() {
            match op {
                WriteOp::Set { path, data } => {
                    let body = serde_json::to_string(data).map_err(json_err)?;
                    tx.execute(
                        "INSERT OR REPLACE INTO documents (path, collection, data)
                         VALUES (?1, ?2, ?3)",
                        params![path, parent_collection(path), body],
                    )
                    .map_err(sql_err)?;
                }
                WriteOp::Update { path, fields } => {
                    let body: Option<String> = tx
                        .query_row(
                            "SELECT data FROM documents WHERE path = ?1",
                            params![path],
                            |row| row.get(0),
                        )
                        .optional()
                        .map_err(sql_err)?;
                    let body = body.ok_or_else(|| TripPlanError::NotFound {
                        path: path.clone(),
                    })?;

                    let mut data: Fields = serde_json::from_str(&body).map_err(json_err)?;
                    for (key, value) in fields {
                        data.insert(key.clone(), value.clone());
                    }
                    let body = serde_json::to_string(&data).map_err(json_err)?;
                    tx.execute(
                        "UPDATE documents SET data = ?2 WHERE path = ?1",
                        params![path, body],
                    )
                    .map_err(sql_err)?;
                }
                WriteOp::Delete { path } => {
                    tx.execute("DELETE FROM documents WHERE path = ?1", params![path])
                        .map_err(sql_err)?;
                }
            }
            affected.insert(op.path().to_string());
        }

        tx.commit().map_err(sql_err)?;
        Ok(affected)
    }

    fn notify(&self, affected: &BTreeSet<String>) {
        for delivery in self.inner.watchers.deliveries_for(affected) {
            match delivery {
                Delivery::Document(path, callback) => {
                    if let Ok(doc) = self.read_document(&path) {
                        callback(doc);
                    }
                }
                Delivery::Collection(path, callback) => {
                    if let Ok(docs) = self.read_collection(&path) {
                        callback(docs);
                    }
                }
            }
        }
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let affected = self.apply(&batch)?;
        self.notify(&affected);
        Ok(())
    }
}

impl DocumentStore for SqliteStore {
    fn allocate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn get_document(&self, path: &str) -> Result<Option<Document>> {
        ensure_document_path(path)?;
        self.read_document(path)
    }

    fn list_documents(&self, collection: &str) -> Result<Vec<Document>> {
        ensure_collection_path(collection)?;
        self.read_collection(collection)
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
        debug!("[SqliteStore] watch document '{}' (#{})", path, id);

        callback(self.read_document(path)?);

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
        debug!("[SqliteStore] watch collection '{}' (#{})", collection, id);

        callback(self.read_collection(collection)?);

        let inner = Arc::clone(&self.inner);
        Ok(WatchHandle::new(move || {
            inner.watchers.unregister(id);
        }))
    }
}
