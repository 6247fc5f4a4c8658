use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Delivery to {endpoint} failed: {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Delivery to {endpoint} rejected with status {status}")]
    Rejected { endpoint: String, status: u16 },

    #[error("Delivery failed: {reason}")]
    DeliveryFailed { reason: String },

    #[error("Invalid tracker config: {field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("Invalid pipeline config: {reason}")]
    InvalidConfig { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
