use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::retry::{is_retryable_status, retry_transient, RetryConfig};

const DEFAULT_UPLOAD_URL: &str = "http://localhost:5000/upload";
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extraction request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Endpoint returned an unreadable expiry date: {0}")]
    InvalidDate(String),
}

impl ExtractionError {
    /// Server hiccups and network trouble are worth another attempt, bad input isn't
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::RequestFailed { status, .. } => {
                reqwest::StatusCode::from_u16(*status)
                    .map(is_retryable_status)
                    .unwrap_or(false)
            }
            ExtractionError::NetworkError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ExtractionError::ParseError(_) | ExtractionError::InvalidDate(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractionError>;

/// What the extraction endpoint sends back
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub expiry_date: Option<String>,
}

impl ExtractionResponse {
    /// Interpret the payload. No date (missing, null or blank) is a perfectly
    /// normal answer: the photo just didn't show one.
    pub fn expiry(&self) -> Result<Option<NaiveDate>> {
        match self.expiry_date.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_date(raw)
                .map(Some)
                .ok_or_else(|| ExtractionError::InvalidDate(raw.to_string())),
        }
    }
}

/// Accepts `2024-05-01` as well as full RFC 3339 timestamps
fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Client for the photo-to-expiry-date endpoint
pub struct ExtractionClient {
    client: reqwest::Client,
    upload_url: String,
    retry_config: RetryConfig,
}

impl ExtractionClient {
    pub fn new(upload_url: impl Into<String>) -> Self {
        Self::with_retry_config(upload_url, RetryConfig::default())
    }

    /// Create client with custom retry configuration
    pub fn with_retry_config(upload_url: impl Into<String>, retry_config: RetryConfig) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("Larder/0.1.0"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            upload_url: upload_url.into(),
            retry_config,
        }
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    /// Upload a photo and ask for the expiry date printed on it
    pub async fn extract_expiry(&self, image: &[u8], file_name: &str) -> Result<Option<NaiveDate>> {
        debug!("Uploading {} ({} bytes) to {}", file_name, image.len(), self.upload_url);

        let response = retry_transient(
            &self.retry_config,
            || async {
                // Multipart forms are consumed by send(), so build one per attempt
                let part = reqwest::multipart::Part::bytes(image.to_vec())
                    .file_name(file_name.to_string());
                let form = reqwest::multipart::Form::new().part("file", part);

                let response = self
                    .client
                    .post(&self.upload_url)
                    .multipart(form)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ExtractionError::RequestFailed {
                        status: status.as_u16(),
                        body,
                    });
                }

                let body = response.text().await?;
                let parsed: ExtractionResponse = serde_json::from_str(&body)?;
                Ok(parsed)
            },
            ExtractionError::is_retryable,
        )
        .await?;

        let expiry = response.expiry()?;
        match expiry {
            Some(date) => info!("Extracted expiry date {} from {}", date, file_name),
            None => info!("No expiry date found in {}", file_name),
        }
        Ok(expiry)
    }
}

impl Default for ExtractionClient {
    fn default() -> Self {
        Self::new(DEFAULT_UPLOAD_URL)
    }
}
