use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Everything the document store can complain about
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Document not found: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },

    #[error("Invalid collection path: {0}")]
    InvalidCollection(String),

    #[error("Store is closed: {0}")]
    Closed(String),

    #[error("Store lock poisoned")]
    Poisoned,
}
