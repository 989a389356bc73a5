//! Monitor configuration and instance identity.
//!
//! A [`MonitorConfig`] is immutable once a monitor is created. Invalid
//! configurations are rejected by [`MonitorConfig::validate_config`] before
//! any cycle runs.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::Minutes;

/// Maximum length of a delivery id. It is embedded in instance ids and
/// idempotency keys, so it is kept short and URL-safe.
const MAX_DELIVERY_ID_LEN: usize = 64;

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

/// Settings supplied when a delivery monitor is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct MonitorConfig {
    #[validate(length(min = 1))]
    pub delivery_id: String,
    #[validate(length(min = 1))]
    pub origin: String,
    #[validate(length(min = 1))]
    pub destination: String,
    #[validate(email)]
    pub recipient_email: String,
    /// Delay at or above which the recipient is notified.
    #[validate(range(min = 1))]
    pub threshold_minutes: Minutes,
    /// Minimum growth over the last notified delay before notifying again.
    #[validate(range(min = 1))]
    pub notify_delta_minutes: Minutes,
}

impl MonitorConfig {
    /// Validate every field, returning the first problem as a
    /// [`CoreError::Validation`].
    ///
    /// Rules:
    /// - `delivery_id` is 1..=64 characters of alphanumerics, hyphen or underscore.
    /// - `origin` and `destination` are non-blank.
    /// - `recipient_email` is a syntactically valid address.
    /// - `threshold_minutes` and `notify_delta_minutes` are positive.
    pub fn validate_config(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        if self.delivery_id.len() > MAX_DELIVERY_ID_LEN {
            return Err(CoreError::Validation(format!(
                "delivery_id must be at most {MAX_DELIVERY_ID_LEN} characters"
            )));
        }
        if !self
            .delivery_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::Validation(
                "delivery_id may only contain alphanumeric, hyphen, or underscore characters"
                    .to_string(),
            ));
        }
        if self.origin.trim().is_empty() {
            return Err(CoreError::Validation("origin must not be blank".to_string()));
        }
        if self.destination.trim().is_empty() {
            return Err(CoreError::Validation(
                "destination must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InstanceId
// ---------------------------------------------------------------------------

/// Identity of one monitor instance: `delivery-{delivery_id}-{YYYY-MM-DD}`.
///
/// One instance per delivery per calendar day of creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn for_delivery(delivery_id: &str, creation_date: NaiveDate) -> Self {
        Self(format!(
            "delivery-{delivery_id}-{}",
            creation_date.format("%Y-%m-%d")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
