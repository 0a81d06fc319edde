use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

/// Field map of a single document, exactly what gets serialized into the `data` column
pub type Fields = Map<String, Value>;

/// A stored document: its id within the collection plus its fields
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// What subscribers receive
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// Complete, ordered contents of the collection after a change
    Snapshot(Vec<Document>),
    /// The store went away; no more events will follow
    Closed(String),
}

/// A live subscription to one collection
///
/// The first event is always the current snapshot. Dropping the receiver is
/// enough to unsubscribe, the store prunes dead senders on the next broadcast.
pub struct Subscription {
    pub id: u64,
    pub collection: String,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

struct Subscriber {
    id: u64,
    collection: String,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

/// Document store using SQLite
///
/// Documents live in collections addressed by slash-separated paths
/// (`foodItems/alice`, `ngos/feed-the-city/donations`). Every committed write
/// re-broadcasts the full collection to its subscribers, which is how the
/// hosted database we replace behaves too.
pub struct DocumentStore {
    conn: Mutex<Connection>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscription: AtomicU64,
    data_version: Mutex<i64>,
    closed: Mutex<Option<String>>,
}

impl DocumentStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        debug!("Opened document store at {}", db_path);
        Self::from_connection(conn)
    }

    /// Throwaway store, handy for tests and dry runs
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn)?;
        let version = Self::read_data_version(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            data_version: Mutex::new(version),
            closed: Mutex::new(None),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        // rowid keeps insertion order, which is the order snapshots are delivered in
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            [],
        )?;

        Ok(())
    }

    fn read_data_version(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.ensure_open()?;
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn ensure_open(&self) -> Result<()> {
        let closed = self.closed.lock().map_err(|_| StoreError::Poisoned)?;
        match closed.as_ref() {
            Some(reason) => Err(StoreError::Closed(reason.clone())),
            None => Ok(()),
        }
    }

    /// Insert a document under a freshly generated id
    pub fn create(&self, collection: &str, fields: &Fields) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.put(collection, &id, fields)?;
        Ok(id)
    }

    /// Insert or replace a document with a caller-chosen id
    pub fn put(&self, collection: &str, id: &str, fields: &Fields) -> Result<()> {
        validate_collection(collection)?;
        let data = serde_json::to_string(fields)?;

        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO documents (collection, id, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at",
                params![collection, id, data, chrono::Utc::now().timestamp()],
            )?;
        }

        debug!("Wrote {}/{}", collection, id);
        self.broadcast(collection)
    }

    /// Merge `patch` into an existing document
    ///
    /// A `null` value removes the field, same as the hosted database.
    pub fn update(&self, collection: &str, id: &str, patch: &Fields) -> Result<()> {
        validate_collection(collection)?;

        {
            let conn = self.conn()?;
            let existing: Option<String> = conn
                .query_row(
                    "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;

            let existing = existing.ok_or_else(|| StoreError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

            let mut fields: Fields = serde_json::from_str(&existing)?;
            for (key, value) in patch {
                if value.is_null() {
                    fields.remove(key);
                } else {
                    fields.insert(key.clone(), value.clone());
                }
            }

            conn.execute(
                "UPDATE documents SET data = ?3, updated_at = ?4
                 WHERE collection = ?1 AND id = ?2",
                params![
                    collection,
                    id,
                    serde_json::to_string(&fields)?,
                    chrono::Utc::now().timestamp()
                ],
            )?;
        }

        debug!("Updated {}/{}", collection, id);
        self.broadcast(collection)
    }

    /// Remove a document. Deleting something that isn't there is not an error.
    pub fn delete(&self, collection: &str, id: &str) -> Result<()> {
        validate_collection(collection)?;

        let removed = {
            let conn = self.conn()?;
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )?
        };

        if removed == 0 {
            debug!("Delete of missing document {}/{}", collection, id);
            return Ok(());
        }

        self.broadcast(collection)
    }

    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        validate_collection(collection)?;
        let conn = self.conn()?;

        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(data) => Ok(Some(Document {
                id: id.to_string(),
                fields: serde_json::from_str(&data)?,
            })),
            None => Ok(None),
        }
    }

    /// All documents of a collection in insertion order
    pub fn list(&self, collection: &str) -> Result<Vec<Document>> {
        validate_collection(collection)?;
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, data FROM documents WHERE collection = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, data) = row?;
            docs.push(Document {
                id,
                fields: serde_json::from_str(&data)?,
            });
        }

        Ok(docs)
    }

    /// Subscribe to a collection. The current snapshot is queued right away.
    ///
    /// The snapshot is read and the subscriber registered under the subscriber
    /// lock, so a write committing meanwhile is either in that snapshot or
    /// broadcast to the new subscriber afterwards.
    pub fn subscribe(&self, collection: &str) -> Result<Subscription> {
        let mut subscribers = self.subscribers.lock().map_err(|_| StoreError::Poisoned)?;
        let snapshot = self.list(collection)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);

        // Receiver is still in our hands, this send cannot fail
        let _ = tx.send(ChangeEvent::Snapshot(snapshot));

        subscribers.push(Subscriber {
            id,
            collection: collection.to_string(),
            tx,
        });
        drop(subscribers);

        debug!("Subscription {} opened on {}", id, collection);
        Ok(Subscription {
            id,
            collection: collection.to_string(),
            events: rx,
        })
    }

    /// Drop a subscription. Unknown ids are ignored so this can be called twice.
    pub fn unsubscribe(&self, subscription_id: u64) -> Result<()> {
        let mut subscribers = self.subscribers.lock().map_err(|_| StoreError::Poisoned)?;
        let before = subscribers.len();
        subscribers.retain(|s| s.id != subscription_id);

        if subscribers.len() < before {
            debug!("Subscription {} closed", subscription_id);
        }
        Ok(())
    }

    /// Number of live subscriptions on a collection
    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.subscribers
            .lock()
            .map(|subs| {
                subs.iter()
                    .filter(|s| s.collection == collection && !s.tx.is_closed())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Pick up commits made through other connections to the same database file
    ///
    /// Returns true when something changed and subscribers were refreshed.
    pub fn poll_changes(&self) -> Result<bool> {
        let version = {
            let conn = self.conn()?;
            Self::read_data_version(&conn)?
        };

        {
            let mut last = self.data_version.lock().map_err(|_| StoreError::Poisoned)?;
            if *last == version {
                return Ok(false);
            }
            *last = version;
        }

        let collections: Vec<String> = {
            let subscribers = self.subscribers.lock().map_err(|_| StoreError::Poisoned)?;
            let mut names: Vec<String> = subscribers.iter().map(|s| s.collection.clone()).collect();
            names.sort();
            names.dedup();
            names
        };

        debug!("External change detected, refreshing {} collections", collections.len());
        for collection in collections {
            self.broadcast(&collection)?;
        }

        Ok(true)
    }

    /// Shut the store down and tell every subscriber about it
    pub fn close(&self, reason: &str) -> Result<()> {
        {
            let mut closed = self.closed.lock().map_err(|_| StoreError::Poisoned)?;
            if closed.is_some() {
                return Ok(());
            }
            *closed = Some(reason.to_string());
        }

        let mut subscribers = self.subscribers.lock().map_err(|_| StoreError::Poisoned)?;
        for sub in subscribers.drain(..) {
            let _ = sub.tx.send(ChangeEvent::Closed(reason.to_string()));
        }

        info!("Document store closed: {}", reason);
        Ok(())
    }

    /// Send the current contents of `collection` to its subscribers
    ///
    /// Reading and sending happen under one hold of the subscriber lock.
    /// Concurrent writers therefore deliver snapshots in the order they were
    /// read, and the last one a subscriber sees reflects every commit before it.
    fn broadcast(&self, collection: &str) -> Result<()> {
        let mut subscribers = self.subscribers.lock().map_err(|_| StoreError::Poisoned)?;
        if !subscribers.iter().any(|s| s.collection == collection) {
            return Ok(());
        }

        let snapshot = self.list(collection)?;

        subscribers.retain(|sub| {
            if sub.collection != collection {
                return true;
            }
            match sub.tx.send(ChangeEvent::Snapshot(snapshot.clone())) {
                Ok(()) => true,
                Err(_) => {
                    warn!("Dropping subscription {} on {}: receiver gone", sub.id, collection);
                    false
                }
            }
        });

        Ok(())
    }
}

fn validate_collection(collection: &str) -> Result<()> {
    if collection.is_empty() || collection.split('/').any(|segment| segment.trim().is_empty()) {
        return Err(StoreError::InvalidCollection(collection.to_string()));
    }
    Ok(())
}
