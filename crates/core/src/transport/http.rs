use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::debug;

use crate::{
    error::{Result, TelemetryError},
    events::EventBatch,
    transport::{Beacon, Transport},
};

/// `POST {events}` to the logging endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, batch: &EventBatch) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(batch)
            .send()
            .await
            .map_err(|source| TelemetryError::RequestFailed {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Rejected {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Detached POST on the runtime it was created in; the caller never
/// observes the outcome.
pub struct HttpBeacon {
    client: reqwest::Client,
    endpoint: String,
    runtime: Handle,
}

impl HttpBeacon {
    /// Must be called from inside a tokio runtime.
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| TelemetryError::InvalidConfig {
            reason: "beacon requires a running tokio runtime".to_string(),
        })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            runtime,
        })
    }
}

impl Beacon for HttpBeacon {
    fn send_beacon(&self, batch: EventBatch) -> bool {
        let body = match serde_json::to_vec(&batch) {
            Ok(body) => body,
            Err(err) => {
                debug!(%err, "beacon payload not serializable");
                return false;
            }
        };

        let request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .body(body);
        let endpoint = self.endpoint.clone();
        let len = batch.len();

        self.runtime.spawn(async move {
            match request.send().await {
                Ok(response) => {
                    debug!(%endpoint, status = response.status().as_u16(), len, "beacon sent")
                }
                Err(err) => debug!(%endpoint, %err, len, "beacon lost"),
            }
        });
        true
    }
}
