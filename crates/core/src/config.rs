use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TelemetryError},
    types::ViewerProfile,
};

/// Supplied by the screen that mounts a tracker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    pub page_id: String,
    pub condition: String,
    pub participant_id: String,
    #[serde(default)]
    pub viewer_profile: Option<ViewerProfile>,
}

impl TrackerConfig {
    pub fn new(
        page_id: impl Into<String>,
        condition: impl Into<String>,
        participant_id: impl Into<String>,
    ) -> Self {
        Self {
            page_id: page_id.into(),
            condition: condition.into(),
            participant_id: participant_id.into(),
            viewer_profile: None,
        }
    }

    pub fn with_viewer_profile(mut self, profile: ViewerProfile) -> Self {
        self.viewer_profile = Some(profile);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("pageId", &self.page_id),
            ("condition", &self.condition),
            ("participantId", &self.participant_id),
        ] {
            if value.trim().is_empty() {
                return Err(TelemetryError::EmptyField { field });
            }
        }
        Ok(())
    }
}

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8787/api/log";
pub const DEFAULT_BEACON_ENDPOINT: &str = "http://127.0.0.1:8787/api/log/beacon";
pub const DEFAULT_STORAGE_KEY: &str = "feedlab.sessionId";

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub endpoint: String,
    pub beacon_endpoint: String,
    pub heartbeat_interval: Duration,
    pub flush_interval: Duration,
    pub storage_key: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            beacon_endpoint: DEFAULT_BEACON_ENDPOINT.to_string(),
            heartbeat_interval: Duration::from_millis(100),
            flush_interval: Duration::from_millis(400),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `FEEDLAB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Ok(endpoint) = std::env::var("FEEDLAB_ENDPOINT") {
            cfg.endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("FEEDLAB_BEACON_ENDPOINT") {
            cfg.beacon_endpoint = endpoint;
        }
        if let Ok(ms) = std::env::var("FEEDLAB_HEARTBEAT_MS") {
            cfg.heartbeat_interval = parse_millis("FEEDLAB_HEARTBEAT_MS", &ms)?;
        }
        if let Ok(ms) = std::env::var("FEEDLAB_FLUSH_MS") {
            cfg.flush_interval = parse_millis("FEEDLAB_FLUSH_MS", &ms)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() || self.flush_interval.is_zero() {
            return Err(TelemetryError::InvalidConfig {
                reason: "intervals must be > 0".to_string(),
            });
        }
        if self.storage_key.trim().is_empty() {
            return Err(TelemetryError::InvalidConfig {
                reason: "storage_key must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_millis(var: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| TelemetryError::InvalidConfig {
            reason: format!("{var}={raw} is not a millisecond count"),
        })
}
