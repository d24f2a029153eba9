//! Report hand-off to the mail relay.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use enricher_shared::{EmailConfig, Result};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::{build_client, post_json};

/// Attachment name of the delivered report.
pub const REPORT_FILENAME: &str = "report.csv";

const REPORT_BODY: &str = "<!DOCTYPE html>
<html>
<body style=\"font-family: Arial, sans-serif;\">
  <h1 style=\"font-size: 24px;\">Your enriched company report is ready</h1>
  <p>Please find the attached CSV file with one row per submitted company.</p>
</body>
</html>
";

/// Delivers a finished report to a recipient.
#[async_trait]
pub trait ReportMailer: Send + Sync {
    async fn send_report(&self, recipient: &str, csv: &[u8]) -> Result<()>;
}

pub struct HttpReportMailer {
    client: Client,
    endpoint: String,
    subject: String,
}

impl HttpReportMailer {
    pub fn new(endpoint: impl Into<String>, subject: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            endpoint: endpoint.into(),
            subject: subject.into(),
        })
    }

    pub(crate) fn payload(&self, recipient: &str, csv: &[u8]) -> Value {
        json!({
            "recipient": recipient,
            "subject": self.subject,
            "body": REPORT_BODY,
            "attachment": {
                "filename": REPORT_FILENAME,
                "content_type": "text/csv",
                "data": STANDARD.encode(csv),
            }
        })
    }
}

#[async_trait]
impl ReportMailer for HttpReportMailer {
    #[instrument(skip_all, fields(recipient = %recipient, bytes = csv.len()))]
    async fn send_report(&self, recipient: &str, csv: &[u8]) -> Result<()> {
        post_json(&self.client, &self.endpoint, &self.payload(recipient, csv)).await?;
        info!("report handed to mail relay");
        Ok(())
    }
}

/// Build the mailer when an endpoint is configured.
pub fn build_mailer(config: &EmailConfig) -> Result<Option<Arc<dyn ReportMailer>>> {
    match config.endpoint.as_deref().map(str::trim) {
        Some(endpoint) if !endpoint.is_empty() => Ok(Some(Arc::new(HttpReportMailer::new(
            endpoint,
            config.subject.clone(),
        )?))),
        _ => Ok(None),
    }
}
