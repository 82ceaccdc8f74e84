/// Status endpoint client: fetches the receiver's `origin_status` document
/// and extracts per-device entries.
///
/// Transport failures and non-200 responses are retried forever at a fixed
/// delay. The daemon has nothing useful to do without status data.
use crate::config::MonitorConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-device entry in the status document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceStatus {
    /// `None` when the receiver omits the field or reports null.
    #[serde(default)]
    pub injection_status: Option<bool>,
    /// Unix seconds of the most recent data point.
    #[serde(default)]
    pub latest_data: Option<f64>,
}

/// Body of `GET /{status_path}/`.
///
/// Entries stay as raw JSON until a device is looked up, so one malformed
/// entry only affects its own origin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusDocument {
    #[serde(default)]
    pub origin_status: HashMap<String, serde_json::Value>,
}

impl StatusDocument {
    pub fn device(&self, origin: &str) -> Result<DeviceStatus, StatusError> {
        let entry = self
            .origin_status
            .get(origin)
            .ok_or_else(|| StatusError::UnknownDevice {
                origin: origin.to_string(),
            })?;
        DeviceStatus::deserialize(entry).map_err(|e| StatusError::Entry {
            origin: origin.to_string(),
            source: e,
        })
    }
}

/// Errors surfaced from a status read. Transient failures never appear here.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("status response from {url} is not a valid status document: {source}")]
    Parse {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unknown device {origin:?} in status response")]
    UnknownDevice { origin: String },

    #[error("status entry for {origin:?} is malformed: {source}")]
    Entry {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Anything that can report a device's current status.
pub trait StatusSource {
    async fn device_status(&self, origin: &str) -> Result<DeviceStatus, StatusError>;
}

/// HTTP client for the receiver's status page.
#[derive(Debug, Clone)]
pub struct StatusClient {
    http: reqwest::Client,
    url: String,
    retry_delay: Duration,
}

impl StatusClient {
    pub fn new(
        url: impl Into<String>,
        request_timeout: Duration,
        retry_delay: Duration,
    ) -> Result<Self, StatusError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(StatusError::Client)?;
        Ok(Self {
            http,
            url: url.into(),
            retry_delay,
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, StatusError> {
        Self::new(
            config.status_url(),
            config.request_timeout(),
            config.retry_delay(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the status document, retrying until the endpoint answers 200.
    ///
    /// Only a 200 whose body fails to decode is returned as an error.
    pub async fn fetch(&self) -> Result<StatusDocument, StatusError> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.http.get(&self.url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::OK => {
                    match response.json::<StatusDocument>().await {
                        Ok(doc) => {
                            debug!(
                                attempt,
                                devices = doc.origin_status.len(),
                                "status document fetched"
                            );
                            return Ok(doc);
                        }
                        Err(e) if e.is_decode() => {
                            return Err(StatusError::Parse {
                                url: self.url.clone(),
                                source: e,
                            });
                        }
                        Err(e) => {
                            warn!(url = %self.url, attempt, error = %e, "failed to read status body");
                        }
                    }
                }
                Ok(response) => {
                    warn!(
                        url = %self.url,
                        attempt,
                        status = %response.status(),
                        "status page returned non-200"
                    );
                }
                Err(e) => {
                    warn!(url = %self.url, attempt, error = %e, "status page request failed");
                }
            }
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

impl StatusSource for StatusClient {
    async fn device_status(&self, origin: &str) -> Result<DeviceStatus, StatusError> {
        self.fetch().await?.device(origin)
    }
}
