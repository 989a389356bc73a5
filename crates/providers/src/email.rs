//! Notification email delivery via SMTP.
//!
//! [`SmtpNotifier`] wraps the `lettre` async SMTP transport. The run scope and
//! idempotency key of each email become its RFC 5322 `Message-ID`, and pairs
//! that were delivered recently are remembered so a retried send is a
//! successful no-op.
//! If `SMTP_HOST` is not set, [`EmailConfig::from_env`] returns `None` and
//! [`LogNotifier`] should be used instead.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use delaywatch_core::activities::{ActivityError, Notifier, OutboundEmail};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

impl From<EmailError> for ActivityError {
    fn from(e: EmailError) -> Self {
        match &e {
            EmailError::Transport(smtp) if !smtp.is_permanent() => {
                ActivityError::Transient(e.to_string())
            }
            _ => ActivityError::Permanent(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@delaywatch.local";

/// Configuration for the SMTP notifier.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that emails
    /// should only be logged.
    ///
    /// | Variable        | Required | Default                    |
    /// |-----------------|----------|----------------------------|
    /// | `SMTP_HOST`     | yes      | —                          |
    /// | `SMTP_PORT`     | no       | `587`                      |
    /// | `SMTP_FROM`     | no       | `noreply@delaywatch.local` |
    /// | `SMTP_USER`     | no       | —                          |
    /// | `SMTP_PASSWORD` | no       | —                          |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }

    /// Domain used in generated `Message-ID` headers.
    pub fn message_id_domain(&self) -> &str {
        self.from_address
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim_end_matches('>'))
            .filter(|domain| !domain.is_empty())
            .unwrap_or("delaywatch.local")
    }
}

// ---------------------------------------------------------------------------
// SmtpNotifier
// ---------------------------------------------------------------------------

/// How long a delivered email is remembered. Retries of a send happen
/// within one cycle, so this only needs to outlast the retry window.
const DELIVERED_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on remembered deliveries.
const DELIVERED_CAPACITY: usize = 10_000;

/// Recently delivered `(scope, idempotency key)` pairs, oldest first.
#[derive(Debug)]
struct DeliveredLedger {
    entries: HashMap<(String, String), Instant>,
    order: VecDeque<(String, String)>,
    ttl: Duration,
    capacity: usize,
}

impl DeliveredLedger {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            ttl,
            capacity,
        }
    }

    fn contains(&mut self, scope: &str, key: &str, now: Instant) -> bool {
        self.prune(now);
        self.entries.contains_key(&(scope.to_string(), key.to_string()))
    }

    fn insert(&mut self, scope: &str, key: &str, now: Instant) {
        self.prune(now);
        let entry = (scope.to_string(), key.to_string());
        if self.entries.insert(entry.clone(), now).is_none() {
            self.order.push_back(entry);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.order.front() {
            let expired = self
                .entries
                .get(oldest)
                .map_or(true, |at| now.saturating_duration_since(*at) >= self.ttl);
            if !expired {
                break;
            }
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// Sends notification emails via SMTP, at most once per run scope and
/// idempotency key.
pub struct SmtpNotifier {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    /// Emails the SMTP server has accepted recently.
    delivered: Mutex<DeliveredLedger>,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: transport_builder.build(),
            config,
            delivered: Mutex::new(DeliveredLedger::new(DELIVERED_TTL, DELIVERED_CAPACITY)),
        })
    }

    /// Assemble the MIME message for `email`.
    pub fn build_message(&self, email: &OutboundEmail) -> Result<Message, EmailError> {
        build_message(&self.config, email)
    }

    /// Send `email` unless the same run already delivered its key.
    pub async fn deliver(&self, email: &OutboundEmail) -> Result<(), EmailError> {
        if self.already_delivered(email) {
            tracing::debug!(
                scope = %email.scope,
                idempotency_key = %email.idempotency_key,
                "Email already delivered, skipping",
            );
            return Ok(());
        }

        let message = self.build_message(email)?;
        self.transport.send(message).await?;
        self.mark_delivered(email);

        tracing::info!(
            to = %email.to,
            idempotency_key = %email.idempotency_key,
            "Notification email sent",
        );
        Ok(())
    }

    fn already_delivered(&self, email: &OutboundEmail) -> bool {
        self.delivered
            .lock()
            .map(|mut ledger| {
                ledger.contains(&email.scope, &email.idempotency_key, Instant::now())
            })
            .unwrap_or(false)
    }

    fn mark_delivered(&self, email: &OutboundEmail) {
        if let Ok(mut ledger) = self.delivered.lock() {
            ledger.insert(&email.scope, &email.idempotency_key, Instant::now());
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_notification_email(&self, email: &OutboundEmail) -> Result<(), ActivityError> {
        Ok(self.deliver(email).await?)
    }
}

fn build_message(config: &EmailConfig, email: &OutboundEmail) -> Result<Message, EmailError> {
    Message::builder()
        .from(config.from_address.parse()?)
        .to(email.to.parse()?)
        .subject(email.subject.clone())
        .message_id(Some(format!(
            "<{}.{}@{}>",
            email.idempotency_key,
            email.scope,
            config.message_id_domain()
        )))
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| EmailError::Build(e.to_string()))
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

/// Writes notifications to the log instead of sending them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification_email(&self, email: &OutboundEmail) -> Result<(), ActivityError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            scope = %email.scope,
            idempotency_key = %email.idempotency_key,
            body = %email.body,
            "Notification email (not sent, SMTP not configured)",
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
            from_address: "alerts@example.com".to_string(),
            smtp_user: None,
            smtp_password: None,
        }
    }

    fn email() -> OutboundEmail {
        OutboundEmail {
            to: "dispatch@example.com".to_string(),
            subject: "Delivery order-1 delayed by 35 minutes".to_string(),
            body: "Running late.".to_string(),
            idempotency_key: "order-1-1".to_string(),
            scope: "delivery-order-1-2026-10-19.1".to_string(),
        }
    }

    #[test]
    fn message_id_is_derived_from_key_and_scope() {
        let message = build_message(&config(), &email()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains(
            "Message-ID: <order-1-1.delivery-order-1-2026-10-19.1@example.com>"
        ));
        assert!(raw.contains("Subject: Delivery order-1 delayed by 35 minutes"));
    }

    #[test]
    fn bad_recipient_is_permanent() {
        let mut bad = email();
        bad.to = "not-an-email".to_string();
        let err = build_message(&config(), &bad).unwrap_err();
        assert!(err.to_string().contains("Email address parse error"));
        assert!(!ActivityError::from(err).is_retryable());
    }

    #[test]
    fn message_id_domain_falls_back() {
        let mut c = config();
        c.from_address = "Delay Watch <alerts@fleet.example.org>".to_string();
        assert_eq!(c.message_id_domain(), "fleet.example.org");
        c.from_address = "nobody".to_string();
        assert_eq!(c.message_id_domain(), "delaywatch.local");
    }

    #[tokio::test]
    async fn delivered_key_is_not_sent_again() {
        let notifier = SmtpNotifier::new(config()).unwrap();
        notifier.mark_delivered(&email());

        // No SMTP server is reachable; success proves the send was skipped.
        notifier.send_notification_email(&email()).await.unwrap();
    }

    #[tokio::test]
    async fn same_key_from_another_run_is_sent() {
        let mut c = config();
        c.smtp_host = "smtp.invalid".to_string();
        let notifier = SmtpNotifier::new(c).unwrap();
        notifier.mark_delivered(&email());

        let next_day = OutboundEmail {
            subject: "Delivery order-1 delayed by 40 minutes".to_string(),
            scope: "delivery-order-1-2026-10-20.2".to_string(),
            ..email()
        };

        // The host does not resolve, so an attempted send fails.
        assert!(notifier.send_notification_email(&next_day).await.is_err());
    }

    #[test]
    fn ledger_is_scoped_per_run() {
        let now = Instant::now();
        let mut ledger = DeliveredLedger::new(DELIVERED_TTL, DELIVERED_CAPACITY);
        ledger.insert("run-a", "order-1-1", now);

        assert!(ledger.contains("run-a", "order-1-1", now));
        assert!(!ledger.contains("run-b", "order-1-1", now));
        assert!(!ledger.contains("run-a", "order-1-2", now));
    }

    #[test]
    fn ledger_forgets_entries_after_ttl() {
        let start = Instant::now();
        let mut ledger = DeliveredLedger::new(Duration::from_secs(60), DELIVERED_CAPACITY);
        ledger.insert("run-a", "order-1-1", start);

        assert!(ledger.contains("run-a", "order-1-1", start + Duration::from_secs(59)));
        assert!(!ledger.contains("run-a", "order-1-1", start + Duration::from_secs(60)));
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn ledger_evicts_oldest_beyond_capacity() {
        let now = Instant::now();
        let mut ledger = DeliveredLedger::new(DELIVERED_TTL, 2);
        ledger.insert("run-a", "order-1-1", now);
        ledger.insert("run-a", "order-1-2", now);
        ledger.insert("run-a", "order-1-3", now);

        assert_eq!(ledger.len(), 2);
        assert!(!ledger.contains("run-a", "order-1-1", now));
        assert!(ledger.contains("run-a", "order-1-3", now));
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.send_notification_email(&email()).await.is_ok());
    }

    #[test]
    fn email_error_display_build() {
        let err = EmailError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "Email build error: missing body");
    }
}
