//! Company-metadata batch client.

use std::collections::HashMap;

use async_trait::async_trait;
use enricher_shared::{CanonicalDomain, MetadataConfig, Result};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::http::{build_client, decode_json, transport_error};
use crate::records::AttributeRecord;
use crate::retry::RetryPolicy;
use crate::{MetadataProvider, ProviderKind};

/// POSTs `{"websites": [...]}` and reads a map of domain to record list.
pub struct HttpMetadataProvider {
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpMetadataProvider {
    pub fn new(config: &MetadataConfig, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config.url.clone(),
            retry,
        })
    }

    async fn post_once(&self, body: &Value) -> Result<HashMap<String, Value>> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&self.url, e))?;
        decode_json(ProviderKind::Metadata, &self.url, response).await
    }
}

#[async_trait]
impl MetadataProvider for HttpMetadataProvider {
    #[instrument(skip_all, fields(domains = domains.len()))]
    async fn fetch_batch(
        &self,
        domains: &[CanonicalDomain],
    ) -> Result<HashMap<CanonicalDomain, Vec<AttributeRecord>>> {
        let body = json!({ "websites": domains });
        let raw = self
            .retry
            .execute("metadata.batch", || self.post_once(&body))
            .await?;

        let mut records = HashMap::with_capacity(raw.len());
        for (domain, value) in raw {
            // A value that is not a list of records means no data for that domain.
            let docs: Vec<AttributeRecord> = match serde_json::from_value(value) {
                Ok(docs) => docs,
                Err(e) => {
                    debug!(%domain, error = %e, "ignoring undecodable metadata entry");
                    Vec::new()
                }
            };
            records.insert(CanonicalDomain::from_normalized(domain), docs);
        }

        debug!(returned = records.len(), "metadata batch decoded");
        Ok(records)
    }
}
