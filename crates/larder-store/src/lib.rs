// SQLite-backed document store with live subscriptions
// Stands in for the hosted real-time database so everything runs offline

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{ChangeEvent, Document, DocumentStore, Fields, Subscription};
