use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{TelemetryError, TelemetryRecord};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait RemoteBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, record: &TelemetryRecord<'_>) -> Result<(), TelemetryError>;
}

/// Posts each event as JSON to an analytics ingestion endpoint.
pub struct HttpBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    project: String,
}

impl HttpBackend {
    pub fn new(http: reqwest::Client, endpoint: String, api_key: Option<String>, project: String) -> Self {
        Self {
            http,
            endpoint,
            api_key,
            project,
        }
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, record: &TelemetryRecord<'_>) -> Result<(), TelemetryError> {
        let mut req = self
            .http
            .post(&self.endpoint)
            .timeout(SEND_TIMEOUT)
            .json(&json!({ "project": self.project, "event": record }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TelemetryError::Remote(format!(
                "{} returned {}",
                self.endpoint,
                resp.status()
            )))
        }
    }
}
