// SQLite adapter - wraps larder_store::DocumentStore behind the Store trait
use std::sync::Arc;

use async_trait::async_trait;
use larder_store::{ChangeEvent, Document, DocumentStore, StoreError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::store::{Fields, Record, SnapshotStream, Store, StoreEvent, SubscriptionHandle};
use crate::{Error, Result};

/// Store backed by the embedded document database
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<DocumentStore>,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let store = DocumentStore::open(db_path).map_err(store_error)?;
        Ok(Self::from_document_store(Arc::new(store)))
    }

    pub fn in_memory() -> Result<Self> {
        let store = DocumentStore::in_memory().map_err(store_error)?;
        Ok(Self::from_document_store(Arc::new(store)))
    }

    pub fn from_document_store(inner: Arc<DocumentStore>) -> Self {
        Self { inner }
    }

    /// Direct access for things the trait doesn't cover (polling, shutdown)
    pub fn document_store(&self) -> &Arc<DocumentStore> {
        &self.inner
    }

    /// Refresh subscribers if another process wrote to the database
    pub fn poll_changes(&self) -> Result<bool> {
        self.inner.poll_changes().map_err(store_error)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn subscribe(&self, collection: &str) -> Result<SnapshotStream> {
        let mut subscription = self.inner.subscribe(collection).map_err(store_error)?;
        let handle = SubscriptionHandle(subscription.id);
        let (tx, rx) = mpsc::unbounded_channel();

        // Relay in order; one task per subscription keeps snapshots FIFO
        let collection = collection.to_string();
        tokio::spawn(async move {
            while let Some(event) = subscription.events.recv().await {
                let event = match event {
                    ChangeEvent::Snapshot(docs) => {
                        StoreEvent::Snapshot(docs.into_iter().map(document_to_record).collect())
                    }
                    ChangeEvent::Closed(reason) => StoreEvent::ConnectionLost(reason),
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            debug!("Relay for {} finished", collection);
        });

        Ok(SnapshotStream::new(handle, rx))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Err(e) = self.inner.unsubscribe(handle.0) {
            warn!("Failed to release subscription {}: {}", handle.0, e);
        }
    }

    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        let doc = self.inner.get(collection, id).map_err(store_error)?;
        Ok(doc.map(document_to_record))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Record>> {
        let docs = self.inner.list(collection).map_err(store_error)?;
        Ok(docs.into_iter().map(document_to_record).collect())
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        self.inner.create(collection, &fields).map_err(store_error)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.inner.update(collection, id, &fields).map_err(store_error)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.inner.delete(collection, id).map_err(store_error)
    }
}

fn document_to_record(doc: Document) -> Record {
    Record {
        id: doc.id,
        fields: doc.fields,
    }
}

/// Map database failures onto engine errors
fn store_error(e: StoreError) -> Error {
    match e {
        StoreError::DocumentNotFound { collection, id } => {
            Error::NotFound(format!("{}/{}", collection, id))
        }
        StoreError::Closed(reason) => Error::ConnectionLost(reason),
        StoreError::InvalidCollection(path) => {
            Error::Validation(format!("invalid collection path: {}", path))
        }
        other => Error::StoreError(other.to_string()),
    }
}
