//! Collaborator contracts consumed by the monitor.
//!
//! Implementations live in `delaywatch-providers`; tests use scripted fakes.
//! Every call may fail and must be safe to retry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Minutes;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivityError {
    /// Network or provider hiccup; retrying may succeed.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Retrying the same request will not help (bad credentials, rejected input).
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ActivityError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActivityError::Transient(_))
    }
}

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

/// Travel times for the route, plus the derived delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficConditions {
    pub planned_seconds: i64,
    pub in_traffic_seconds: i64,
    pub delay_minutes: Minutes,
}

impl TrafficConditions {
    pub fn from_seconds(planned_seconds: i64, in_traffic_seconds: i64) -> Self {
        Self {
            planned_seconds,
            in_traffic_seconds,
            delay_minutes: delay_minutes(planned_seconds, in_traffic_seconds),
        }
    }

    /// Reading used when the provider reports no route between the points.
    pub fn no_route() -> Self {
        Self {
            planned_seconds: 0,
            in_traffic_seconds: 0,
            delay_minutes: 0,
        }
    }
}

/// `max(0, round((in_traffic - planned) / 60))`.
pub fn delay_minutes(planned_seconds: i64, in_traffic_seconds: i64) -> Minutes {
    let diff = in_traffic_seconds.saturating_sub(planned_seconds) as f64;
    ((diff / 60.0).round() as Minutes).max(0)
}

/// Input for the delay message writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelayMessageRequest {
    pub origin: String,
    pub destination: String,
    pub delay_minutes: Minutes,
}

/// A fully rendered email ready to dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub idempotency_key: String,
    /// The monitor run that issued the email. Idempotency keys restart for
    /// every run, so they only identify an email together with this scope.
    pub scope: String,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TrafficSource: Send + Sync {
    async fn fetch_traffic_conditions(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<TrafficConditions, ActivityError>;
}

#[async_trait]
pub trait MessageWriter: Send + Sync {
    /// Produce human-readable text describing the delay. Never empty.
    async fn generate_delay_message(
        &self,
        request: &DelayMessageRequest,
    ) -> Result<String, ActivityError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send an email. Repeating a call with the same scope and idempotency
    /// key must not deliver a second copy.
    async fn send_notification_email(&self, email: &OutboundEmail) -> Result<(), ActivityError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_rounds_to_nearest_minute() {
        assert_eq!(delay_minutes(600, 600 + 89), 1);
        assert_eq!(delay_minutes(600, 600 + 90), 2);
        assert_eq!(delay_minutes(1200, 1200 + 35 * 60), 35);
    }

    #[test]
    fn faster_than_planned_is_zero_delay() {
        assert_eq!(delay_minutes(1800, 1500), 0);
    }

    #[test]
    fn extreme_provider_values_do_not_overflow() {
        assert_eq!(delay_minutes(i64::MAX, i64::MIN), 0);
        assert!(delay_minutes(i64::MIN, i64::MAX) > 0);
    }

    #[test]
    fn conditions_carry_derived_delay() {
        let c = TrafficConditions::from_seconds(3000, 3000 + 12 * 60);
        assert_eq!(c.delay_minutes, 12);
        assert_eq!(TrafficConditions::no_route().delay_minutes, 0);
    }

    #[test]
    fn only_transient_errors_retry() {
        assert!(ActivityError::Transient("timeout".into()).is_retryable());
        assert!(!ActivityError::Permanent("bad key".into()).is_retryable());
    }
}
