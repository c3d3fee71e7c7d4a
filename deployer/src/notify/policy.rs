//! Callback retry policy
//!
//! Pure functions: which responses end delivery, and how long to wait
//! between attempts.

use std::time::Duration;

use crate::notify::transport::DeliveryResponse;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Bounded exponential retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub cooldown: CooldownOptions,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            cooldown: CooldownOptions::default(),
        }
    }
}

/// What to do after a delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Delivered,
    Retry,
    Stop,
}

/// Classify the response of one delivery attempt.
///
/// Any 2xx is delivered. 5xx, timeouts and connection failures are worth
/// another attempt. Everything else (4xx, 1xx, 3xx) will not change on retry.
pub fn classify(response: &DeliveryResponse) -> Verdict {
    match response {
        DeliveryResponse::Status(status) if (200..300).contains(status) => Verdict::Delivered,
        DeliveryResponse::Status(status) if *status >= 500 => Verdict::Retry,
        DeliveryResponse::Status(_) => Verdict::Stop,
        DeliveryResponse::Timeout | DeliveryResponse::ConnectionFailed(_) => Verdict::Retry,
    }
}

/// Delay after the given 1-based attempt failed, or `None` when it was the last
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Option<Duration> {
    if attempt == 0 || attempt >= policy.max_attempts {
        return None;
    }
    Some(calc_exp_backoff(&policy.cooldown, attempt - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(&DeliveryResponse::Status(200)), Verdict::Delivered);
        assert_eq!(classify(&DeliveryResponse::Status(204)), Verdict::Delivered);
        assert_eq!(classify(&DeliveryResponse::Status(500)), Verdict::Retry);
        assert_eq!(classify(&DeliveryResponse::Status(503)), Verdict::Retry);
        assert_eq!(classify(&DeliveryResponse::Timeout), Verdict::Retry);
        assert_eq!(
            classify(&DeliveryResponse::ConnectionFailed("refused".to_string())),
            Verdict::Retry
        );
        assert_eq!(classify(&DeliveryResponse::Status(400)), Verdict::Stop);
        assert_eq!(classify(&DeliveryResponse::Status(404)), Verdict::Stop);
        assert_eq!(classify(&DeliveryResponse::Status(302)), Verdict::Stop);
    }

    #[test]
    fn test_backoff_delay_schedule() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=5).map(|attempt| backoff_delay(&policy, attempt)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(4)),
                Some(Duration::from_secs(8)),
                None,
            ]
        );
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            ..Default::default()
        };
        assert_eq!(backoff_delay(&policy, 9), Some(Duration::from_secs(30)));
        assert_eq!(backoff_delay(&policy, 10), None);
    }
}
