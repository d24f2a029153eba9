//! Search-index client: one website query per domain.

use async_trait::async_trait;
use enricher_shared::{CanonicalDomain, Result, SearchIndexConfig};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::http::{build_client, decode_json, transport_error};
use crate::records::{AttributeRecord, SearchResponse};
use crate::retry::RetryPolicy;
use crate::{Lookup, ProviderKind, SearchIndexProvider};

pub struct HttpSearchIndexProvider {
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpSearchIndexProvider {
    pub fn new(config: &SearchIndexConfig, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config.url.clone(),
            retry,
        })
    }

    async fn select_once(&self, query: &str) -> Result<SearchResponse> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("q.op", "OR"), ("q", query), ("sort", "_version_ DESC")])
            .send()
            .await
            .map_err(|e| transport_error(&self.url, e))?;
        decode_json(ProviderKind::SearchIndex, &self.url, response).await
    }
}

#[async_trait]
impl SearchIndexProvider for HttpSearchIndexProvider {
    #[instrument(skip_all, fields(domain = %domain))]
    async fn fetch(&self, domain: &CanonicalDomain) -> Result<Lookup<AttributeRecord>> {
        let query = format!("Website:\"{}\"", domain.as_str().replace('"', ""));
        let result = self
            .retry
            .execute("search_index.select", || self.select_once(&query))
            .await?;

        let doc = result.response.docs.into_iter().next();
        debug!(found = doc.is_some(), "search index queried");
        Ok(Lookup::from_option(doc))
    }
}
