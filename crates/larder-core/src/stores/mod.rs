// Store adapters - bridge concrete databases with the Store trait
pub mod sqlite;

pub use sqlite::SqliteStore;
