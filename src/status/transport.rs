//! HTTP transport for the printer's status endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use super::{PrinterInfo, RawStatus};
use crate::config::PrinterConfig;

const PRODUCT_PATH: &str = "/product";
const DETAIL_PATH: &str = "/detail";

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} returned {status}")]
    Status { endpoint: String, status: reqwest::StatusCode },
    #[error("Printer rejected {endpoint} (code {code}): {message}")]
    Device { endpoint: String, code: i64, message: String },
    #[error("Malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
}

/// Source of identity and telemetry samples.
#[async_trait]
pub trait StatusTransport: Send + Sync {
    /// Lightweight identity call.
    async fn fetch_info(&self) -> Result<PrinterInfo, StatusError>;
    /// Detailed telemetry call.
    async fn fetch_status(&self) -> Result<RawStatus, StatusError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Credentials {
    serial_number: String,
    check_code: String,
}

/// Talks to the printer's JSON API over plain HTTP.
#[derive(Clone)]
pub struct HttpStatusTransport {
    http: Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpStatusTransport {
    pub fn new(
        base_url: impl Into<String>,
        serial_number: impl Into<String>,
        check_code: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StatusError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            credentials: Credentials {
                serial_number: serial_number.into(),
                check_code: check_code.into(),
            },
        })
    }

    pub fn from_config(config: &PrinterConfig) -> Result<Self, StatusError> {
        Self::new(
            config.status_base_url(),
            config.serial_number.clone(),
            config.check_code.clone(),
            Duration::from_millis(config.http_timeout_ms),
        )
    }

    async fn post_envelope<T>(&self, path: &str, key: &str) -> Result<T, StatusError>
    where
        T: DeserializeOwned,
    {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let response = self.http.post(url).json(&self.credentials).send().await?;

        if !response.status().is_success() {
            return Err(StatusError::Status {
                endpoint: path.to_string(),
                status: response.status(),
            });
        }

        let body = response.text().await?;
        unwrap_envelope(path, key, &body)
    }
}

#[async_trait]
impl StatusTransport for HttpStatusTransport {
    async fn fetch_info(&self) -> Result<PrinterInfo, StatusError> {
        self.post_envelope(PRODUCT_PATH, "product").await
    }

    async fn fetch_status(&self) -> Result<RawStatus, StatusError> {
        self.post_envelope(DETAIL_PATH, "detail").await
    }
}

/// Decode `{"code": 0, "message": ..., "<key>": {...}}` and return the payload under `key`.
pub fn unwrap_envelope<T>(endpoint: &str, key: &str, body: &str) -> Result<T, StatusError>
where
    T: DeserializeOwned,
{
    let malformed = |reason: String| StatusError::Malformed {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut envelope: Value = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

    let code = envelope.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(StatusError::Device {
            endpoint: endpoint.to_string(),
            code,
            message,
        });
    }

    let payload = envelope
        .get_mut(key)
        .map(Value::take)
        .filter(|value| !value.is_null())
        .ok_or_else(|| malformed(format!("missing '{}' payload", key)))?;

    serde_json::from_value(payload).map_err(|e| malformed(e.to_string()))
}
