//! HTTP transport for the collector API.

use crate::config::Config;
use crate::types::{BatchedTracks, Tracking};
use crate::Error;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

pub(crate) const HEALTH_PATH: &str = "/health";
pub(crate) const TRACK_PATH: &str = "/track";
pub(crate) const BATCH_PATH: &str = "/batch";

/// Join a collector base URL and an API path.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// HTTP transport for the collector's health, track and batch endpoints.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    health_check_timeout: Duration,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            health_check_timeout: config.health_check_timeout(),
        })
    }

    /// `true` when `GET {base_url}/health` answers with a 2xx status.
    pub async fn check_health(&self, base_url: &str) -> bool {
        let url = endpoint(base_url, HEALTH_PATH);

        let request = self.client.get(&url).timeout(self.health_check_timeout);
        match request.send().await {
            Ok(response) => {
                let status = response.status();
                debug!(endpoint = %url, status = %status, "health check answered");
                status.is_success()
            }
            Err(e) => {
                debug!(endpoint = %url, error = %e, "health check failed");
                false
            }
        }
    }

    /// Post a single event to `/track`.
    pub async fn post_track(&self, base_url: &str, tracking: &Tracking) -> Result<(), Error> {
        self.post(endpoint(base_url, TRACK_PATH), tracking, 1).await
    }

    /// Post a batch of events to `/batch`.
    pub async fn post_batch(&self, base_url: &str, batch: &BatchedTracks) -> Result<(), Error> {
        self.post(endpoint(base_url, BATCH_PATH), batch, batch.len()).await
    }

    async fn post<T: Serialize>(
        &self,
        url: String,
        payload: &T,
        event_count: usize,
    ) -> Result<(), Error> {
        debug!(endpoint = %url, event_count, "sending events");

        let body = serde_json::to_vec(payload)?;
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %url, status = %status, "collector rejected events");
            return Err(Error::Status(status));
        }

        debug!(endpoint = %url, event_count, "events sent successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_construction() {
        assert_eq!(
            endpoint("https://in.example.com", TRACK_PATH),
            "https://in.example.com/track"
        );
        assert_eq!(
            endpoint("https://in.example.com/", BATCH_PATH),
            "https://in.example.com/batch"
        );
        assert_eq!(
            endpoint("https://in.example.com/v1//", HEALTH_PATH),
            "https://in.example.com/v1/health"
        );
    }

    #[test]
    fn test_empty_base_yields_bare_path() {
        assert_eq!(endpoint("", BATCH_PATH), "/batch");
    }
}
