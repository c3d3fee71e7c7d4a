//! Outcome notification with bounded retry

use std::sync::Arc;

use openapi_client::models::CallbackPayload;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::NotificationError;
use crate::notify::policy::{backoff_delay, classify, RetryPolicy, Verdict};
use crate::notify::transport::{CallbackTransport, DeliveryResponse};

/// Where a notification ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    Pending,
    Delivered,
    Exhausted,
    Rejected(u16),
}

/// One outcome notification and its delivery history
#[derive(Debug, Clone)]
pub struct NotificationAttempt {
    pub callback_url: Url,
    pub payload: CallbackPayload,
    pub attempts: u32,
    pub status: NotificationStatus,
    pub last_response: Option<DeliveryResponse>,
}

impl NotificationAttempt {
    pub fn new(callback_url: Url, payload: CallbackPayload) -> Self {
        Self {
            callback_url,
            payload,
            attempts: 0,
            status: NotificationStatus::Pending,
            last_response: None,
        }
    }

    /// Attempts used on success
    pub fn into_result(self) -> Result<u32, NotificationError> {
        match self.status {
            NotificationStatus::Delivered => Ok(self.attempts),
            NotificationStatus::Rejected(status) => {
                Err(NotificationError::PermanentlyRejected { status })
            }
            NotificationStatus::Pending | NotificationStatus::Exhausted => {
                Err(NotificationError::Exhausted {
                    attempts: self.attempts,
                    last: self
                        .last_response
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "never attempted".to_string()),
                })
            }
        }
    }
}

pub struct Notifier {
    transport: Arc<dyn CallbackTransport>,
    policy: RetryPolicy,
}

impl Notifier {
    pub fn new(transport: Arc<dyn CallbackTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Deliver the payload, retrying transient failures. Stops at the
    /// first 2xx, so a delivered notification is never sent again.
    pub async fn notify(&self, callback_url: Url, payload: CallbackPayload) -> NotificationAttempt {
        let mut attempt = NotificationAttempt::new(callback_url, payload);

        while attempt.status == NotificationStatus::Pending {
            attempt.attempts += 1;
            let response = self
                .transport
                .deliver(&attempt.callback_url, &attempt.payload)
                .await;
            debug!(
                "Callback attempt {}/{} to {}: {}",
                attempt.attempts, self.policy.max_attempts, attempt.callback_url, response
            );

            match classify(&response) {
                Verdict::Delivered => {
                    info!(
                        "Delivered {} callback for {} after {} attempt(s)",
                        attempt.payload.status, attempt.payload.app_id, attempt.attempts
                    );
                    attempt.status = NotificationStatus::Delivered;
                }
                Verdict::Stop => {
                    let status = match &response {
                        DeliveryResponse::Status(status) => *status,
                        _ => 0,
                    };
                    error!(
                        "Callback for {} rejected by {}: {}",
                        attempt.payload.app_id, attempt.callback_url, response
                    );
                    attempt.status = NotificationStatus::Rejected(status);
                }
                Verdict::Retry => match backoff_delay(&self.policy, attempt.attempts) {
                    Some(delay) => {
                        warn!(
                            "Callback for {} failed ({}), retrying in {:?}",
                            attempt.payload.app_id, response, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(
                            "Giving up on callback for {} after {} attempts: {}",
                            attempt.payload.app_id, attempt.attempts, response
                        );
                        attempt.status = NotificationStatus::Exhausted;
                    }
                },
            }
            attempt.last_response = Some(response);
        }

        attempt
    }
}
