//! ONOS controller client.
//!
//! Reads `devices`, `links`, `hosts`, `flows` and `intents` from the ONOS
//! REST API with HTTP basic auth. Every failure is a [`TelemetryError`];
//! nothing here panics or retries.

use async_trait::async_trait;
use netintent_config::ControllerConfig;
use netintent_core::error::TelemetryError;
use netintent_core::topology::{ResourceKind, TelemetrySource};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Telemetry source backed by the ONOS REST API.
pub struct OnosClient {
    api_url: String,
    username: String,
    password: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OnosClient {
    /// `api_url` is the API root, e.g. `http://localhost:8181/onos/v1/`.
    pub fn new(
        api_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let mut api_url = api_url.into();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {e}");
                reqwest::Client::new()
            });

        Self {
            api_url,
            username: username.into(),
            password: password.into(),
            timeout,
            client,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.api_url.clone(),
            config.username.clone(),
            config.password_or_default(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn url_for(&self, kind: ResourceKind) -> String {
        format!("{}{}", self.api_url, kind.as_str())
    }
}

#[async_trait]
impl TelemetrySource for OnosClient {
    fn name(&self) -> &str {
        "onos"
    }

    async fn fetch(&self, kind: ResourceKind) -> Result<Value, TelemetryError> {
        let url = self.url_for(kind);
        debug!(%url, "Fetching controller resource");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TelemetryError::Timeout {
                        resource: kind.to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    TelemetryError::Unavailable {
                        resource: kind.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Status {
                resource: kind.to_string(),
                status_code: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await.map_err(|e| TelemetryError::Decode {
            resource: kind.to_string(),
            reason: e.to_string(),
        })?;

        if !payload.is_object() {
            return Err(TelemetryError::Decode {
                resource: kind.to_string(),
                reason: "expected a JSON object".into(),
            });
        }

        Ok(payload)
    }
}
