//! HTTP client for the telemetry endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::TransportError;
use crate::models::TelemetrySnapshot;

/// Anything that can produce one telemetry snapshot per call.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<TelemetrySnapshot, TransportError>;
}

/// Polls a gpx backend with `POST {endpoint}` and an empty JSON object.
#[derive(Clone, Debug)]
pub struct TelemetryClient {
    client: Client,
    endpoint: String,
}

impl TelemetryClient {
    /// Without a timeout a request waits until the connection settles or errors.
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl SnapshotSource for TelemetryClient {
    /// Server-reported errors inside a well-formed body do not fail the call.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch_snapshot(&self) -> Result<TelemetrySnapshot, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let snapshot: TelemetrySnapshot =
            serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))?;

        if snapshot.has_errors() {
            debug!(errors = ?snapshot.errors, "server reported errors");
        }
        debug!(devices = snapshot.data.len(), "snapshot received");

        Ok(snapshot)
    }
}
