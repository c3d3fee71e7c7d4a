//! Callback transport interface

use async_trait::async_trait;
use openapi_client::models::CallbackPayload;
use url::Url;

/// What came back from one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResponse {
    /// The callback answered with this HTTP status
    Status(u16),
    Timeout,
    ConnectionFailed(String),
}

impl std::fmt::Display for DeliveryResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryResponse::Status(status) => write!(f, "HTTP {}", status),
            DeliveryResponse::Timeout => write!(f, "timed out"),
            DeliveryResponse::ConnectionFailed(reason) => write!(f, "connection failed: {}", reason),
        }
    }
}

/// Sends a single callback POST. Retrying is the notifier's job.
#[async_trait]
pub trait CallbackTransport: Send + Sync {
    async fn deliver(&self, url: &Url, payload: &CallbackPayload) -> DeliveryResponse;
}
