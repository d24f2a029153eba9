//! Plain-text alert webhook channel.

use async_trait::async_trait;
use enricher_shared::Result;
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use crate::{Alert, Notifier, build_client, post_json};

/// Posts `{"message": "..."}` to an alert intake endpoint.
pub struct AlertWebhookNotifier {
    client: Client,
    url: String,
}

impl AlertWebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            url: url.into(),
        })
    }
}

/// Service, method, error and details blocks separated by blank lines.
pub(crate) fn format_message(alert: &Alert) -> String {
    format!(
        "Service: {}\n\nMethod: {}\n\nError: {}\n\nDetails: {}",
        alert.origin,
        alert.operation,
        alert.error,
        alert.context_json()
    )
}

#[async_trait]
impl Notifier for AlertWebhookNotifier {
    #[instrument(skip_all, fields(operation = %alert.operation))]
    async fn notify(&self, alert: &Alert) -> Result<()> {
        let body = json!({ "message": format_message(alert) });
        post_json(&self.client, &self.url, &body).await?;
        info!("alert delivered to webhook");
        Ok(())
    }
}
