use thiserror::Error;

/// All the ways the engine can say no
///
/// Every variant is scoped to the operation that raised it; nothing in here
/// is meant to take the process down.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Donation request {request_id} for NGO {ngo_id} is already accepted")]
    AlreadyAccepted { ngo_id: String, request_id: String },

    #[error("Store connection lost: {0}")]
    ConnectionLost(String),

    #[error("Store operation failed: {0}")]
    StoreError(String),

    #[error("Expiry extraction failed: {0}")]
    ExtractionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
