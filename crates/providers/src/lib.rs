//! Production implementations of the monitor's collaborators.
//!
//! - [`traffic`]: Google Distance Matrix travel times over `reqwest`.
//! - [`message`]: delay text from an OpenAI-compatible chat endpoint, or a
//!   fixed template when no API key is configured.
//! - [`email`]: SMTP delivery over `lettre` with an idempotency ledger, or a
//!   log-only notifier when SMTP is not configured.

pub mod email;
pub mod message;
pub mod traffic;

use std::sync::Arc;

use delaywatch_core::activities::{MessageWriter, Notifier};

pub use email::{EmailConfig, EmailError, LogNotifier, SmtpNotifier};
pub use message::{MessageConfig, MessageError, OpenAiMessageWriter, TemplateMessageWriter};
pub use traffic::{GoogleMapsTraffic, TrafficConfig, TrafficError};

/// Pick the message writer configured by the environment.
pub fn message_writer_from_env() -> Arc<dyn MessageWriter> {
    match MessageConfig::from_env() {
        Some(config) => {
            tracing::info!(model = %config.model, "Using chat completions for delay messages");
            Arc::new(OpenAiMessageWriter::new(config))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set, using template delay messages");
            Arc::new(TemplateMessageWriter)
        }
    }
}

/// Pick the notifier configured by the environment.
pub fn notifier_from_env() -> Result<Arc<dyn Notifier>, EmailError> {
    match EmailConfig::from_env() {
        Some(config) => {
            tracing::info!(smtp_host = %config.smtp_host, "Using SMTP notifier");
            Ok(Arc::new(SmtpNotifier::new(config)?))
        }
        None => {
            tracing::warn!("SMTP_HOST not set, notification emails will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}
