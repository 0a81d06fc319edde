// Expiry-date extraction - bridges the HTTP client with the ExpiryExtractor trait
use async_trait::async_trait;
use chrono::NaiveDate;
use larder_api::{ExtractionClient, RetryConfig};

use crate::config::ExtractionConfig;
use crate::{Error, Result};

/// Reads an expiry date off a photo of the packaging
///
/// `Ok(None)` means the photo was processed but showed no date.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExpiryExtractor: Send + Sync {
    async fn extract_expiry(&self, image: &[u8], file_name: &str) -> Result<Option<NaiveDate>>;
}

/// Extractor backed by the upload endpoint
pub struct HttpExtractor {
    client: ExtractionClient,
}

impl HttpExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        let retry = RetryConfig {
            max_retries: config.max_retries,
            initial_delay_ms: config.initial_delay_ms,
            ..RetryConfig::default()
        };

        Self {
            client: ExtractionClient::with_retry_config(config.url.clone(), retry),
        }
    }
}

#[async_trait]
impl ExpiryExtractor for HttpExtractor {
    async fn extract_expiry(&self, image: &[u8], file_name: &str) -> Result<Option<NaiveDate>> {
        self.client
            .extract_expiry(image, file_name)
            .await
            .map_err(|e| Error::ExtractionError(e.to_string()))
    }
}
