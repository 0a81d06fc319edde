// HTTP clients for services the engine talks to but doesn't own
pub mod extraction;
pub mod retry;

pub use extraction::{ExtractionClient, ExtractionError, ExtractionResponse};
pub use retry::RetryConfig;
