//! Chat webhook channel with colour-coded attachments.

use async_trait::async_trait;
use enricher_shared::Result;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::{Alert, Notifier, Severity, build_client, post_json};

pub struct ChatWebhookNotifier {
    client: Client,
    url: String,
}

impl ChatWebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            url: url.into(),
        })
    }
}

fn color(severity: Severity) -> &'static str {
    match severity {
        Severity::Warning => "#f2c744",
        Severity::Error => "#FF0000",
    }
}

fn mrkdwn(text: String) -> Value {
    json!({ "type": "mrkdwn", "text": text })
}

pub(crate) fn format_payload(alert: &Alert) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("{}: {} failed", alert.severity, alert.operation),
            }
        }),
        json!({
            "type": "section",
            "fields": [
                mrkdwn(format!("*Source:*\n{}", alert.origin)),
                mrkdwn(format!(
                    "*Timestamp:*\n{}",
                    alert.raised_at.format("%m/%d/%Y %H:%M UTC")
                )),
            ]
        }),
        json!({
            "type": "section",
            "fields": [mrkdwn(format!("*Method:*\n{}", alert.operation))]
        }),
        json!({
            "type": "section",
            "text": mrkdwn(format!("*Error:*\n`{}`", alert.error))
        }),
    ];

    if !alert.context.is_empty() {
        blocks.push(json!({
            "type": "section",
            "text": mrkdwn(format!("*Details:*\n```\n{}\n```", alert.context_json()))
        }));
    }

    json!({
        "attachments": [{
            "color": color(alert.severity),
            "blocks": blocks,
        }]
    })
}

#[async_trait]
impl Notifier for ChatWebhookNotifier {
    #[instrument(skip_all, fields(operation = %alert.operation))]
    async fn notify(&self, alert: &Alert) -> Result<()> {
        post_json(&self.client, &self.url, &format_payload(alert)).await?;
        info!("alert delivered to chat");
        Ok(())
    }
}
