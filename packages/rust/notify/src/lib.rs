//! Operator alerting and report hand-off.
//!
//! Alerts go through the [`Notifier`] capability, implemented once per channel
//! and chosen by the `[notifications]` config section. Finished reports are
//! handed to a [`ReportMailer`].

mod alert_webhook;
mod chat;
mod mailer;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enricher_shared::{EnricherError, NotificationChannel, NotificationsConfig, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

pub use alert_webhook::AlertWebhookNotifier;
pub use chat::ChatWebhookNotifier;
pub use mailer::{HttpReportMailer, REPORT_FILENAME, ReportMailer, build_mailer};

/// User-Agent string for outbound notification requests.
const USER_AGENT: &str = concat!("Enricher/", env!("CARGO_PKG_VERSION"));

/// Timeout for webhook and mail relay calls.
const NOTIFY_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// The run was refused because of its input.
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Structured description of a run-level failure.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    /// Which service raised the alert.
    pub origin: String,
    /// The operation that failed.
    pub operation: String,
    pub error: String,
    /// Free-form key/value details (row counts, recipient, ...).
    pub context: BTreeMap<String, String>,
    pub severity: Severity,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn error(
        origin: impl Into<String>,
        operation: impl Into<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            origin: origin.into(),
            operation: operation.into(),
            error: error.to_string(),
            context: BTreeMap::new(),
            severity: Severity::Error,
            raised_at: Utc::now(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl std::fmt::Display) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Context rendered as pretty-printed JSON.
    pub(crate) fn context_json(&self) -> String {
        serde_json::to_string_pretty(&self.context).unwrap_or_else(|_| "{}".into())
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// A channel that can deliver an [`Alert`] to operators.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Drops alerts after logging them. Used when no channel is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        debug!(operation = %alert.operation, error = %alert.error, "no notification channel configured");
        Ok(())
    }
}

/// Select the alert channel named by configuration.
pub fn build_notifier(config: &NotificationsConfig) -> Result<Arc<dyn Notifier>> {
    match config.channel {
        NotificationChannel::None => Ok(Arc::new(NoopNotifier)),
        NotificationChannel::AlertWebhook => {
            let url = required_url(&config.alert_webhook_url, "notifications.alert_webhook_url")?;
            Ok(Arc::new(AlertWebhookNotifier::new(url)?))
        }
        NotificationChannel::Chat => {
            let url = required_url(&config.chat_webhook_url, "notifications.chat_webhook_url")?;
            Ok(Arc::new(ChatWebhookNotifier::new(url)?))
        }
    }
}

fn required_url(value: &Option<String>, key: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EnricherError::config(format!("{key} is not set")))
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
        .build()
        .map_err(|e| EnricherError::Notification(format!("failed to build HTTP client: {e}")))
}

pub(crate) async fn post_json(client: &Client, url: &str, body: &serde_json::Value) -> Result<()> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| EnricherError::Notification(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(EnricherError::Notification(format!("{url}: HTTP {status}")));
    }
    Ok(())
}
