//! CRM client: batch account/profile lookup plus a query-based fallback.

use async_trait::async_trait;
use enricher_shared::{CanonicalDomain, CrmConfig, Result, resolve_secret};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

use crate::http::{build_client, decode_json, transport_error};
use crate::records::{CrmAccount, CrmBatchResponse, CrmQueryResponse};
use crate::retry::RetryPolicy;
use crate::{CompanyRef, CrmProvider, Lookup, ProviderKind};

/// Query endpoint and bearer token for the fallback lookup.
struct QueryEndpoint {
    url: String,
    token: String,
}

pub struct HttpCrmProvider {
    client: Client,
    batch_url: String,
    query: Option<QueryEndpoint>,
    retry: RetryPolicy,
}

impl HttpCrmProvider {
    /// The bearer token is read from the configured env var only when a
    /// query endpoint is set.
    pub fn new(config: &CrmConfig, retry: RetryPolicy) -> Result<Self> {
        let query = match &config.query_url {
            Some(url) => Some(QueryEndpoint {
                url: url.clone(),
                token: resolve_secret(&config.access_token_env)?,
            }),
            None => None,
        };

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            batch_url: config.batch_url.clone(),
            query,
            retry,
        })
    }

    async fn post_batch_once(&self, body: &serde_json::Value) -> Result<CrmBatchResponse> {
        let response = self
            .client
            .post(&self.batch_url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&self.batch_url, e))?;
        decode_json(ProviderKind::Crm, &self.batch_url, response).await
    }

    async fn query_once(&self, endpoint: &QueryEndpoint, soql: &str) -> Result<CrmQueryResponse> {
        let response = self
            .client
            .get(&endpoint.url)
            .bearer_auth(&endpoint.token)
            .query(&[("q", soql)])
            .send()
            .await
            .map_err(|e| transport_error(&endpoint.url, e))?;
        decode_json(ProviderKind::Crm, &endpoint.url, response).await
    }
}

#[async_trait]
impl CrmProvider for HttpCrmProvider {
    #[instrument(skip_all, fields(companies = companies.len()))]
    async fn fetch_batch(&self, companies: &[CompanyRef]) -> Result<CrmBatchResponse> {
        let body = json!({ "companies": companies });
        self.retry
            .execute("crm.batch", || self.post_batch_once(&body))
            .await
    }

    #[instrument(skip_all, fields(domain = %domain))]
    async fn find_account(
        &self,
        domain: &CanonicalDomain,
        name: &str,
    ) -> Result<Lookup<CrmAccount>> {
        let Some(endpoint) = &self.query else {
            return Ok(Lookup::NotFound);
        };

        for soql in lookup_queries(domain.as_str(), name) {
            let result = self
                .retry
                .execute("crm.query", || self.query_once(endpoint, &soql))
                .await?;

            if result.total_size > 0 {
                if let Some(account) = result.records.into_iter().next() {
                    debug!(query = %soql, "crm fallback matched");
                    return Ok(Lookup::Found(account));
                }
            }
        }

        Ok(Lookup::NotFound)
    }
}

/// Escape a value for use inside a single-quoted SOQL string literal.
pub fn escape_soql(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Ordered fallback cascade: exact `https://`, `http://` and `https://www.`
/// website matches, a substring match, then an exact company-name match.
pub fn lookup_queries(domain: &str, name: &str) -> Vec<String> {
    const SELECT: &str = "SELECT Id, Name, Owner.Name FROM Account WHERE";

    let bare = domain.strip_prefix("www.").unwrap_or(domain);
    let domain = escape_soql(bare);
    let name = escape_soql(name);

    vec![
        format!("{SELECT} Website = 'https://{domain}' LIMIT 1"),
        format!("{SELECT} Website = 'http://{domain}' LIMIT 1"),
        format!("{SELECT} Website = 'https://www.{domain}' LIMIT 1"),
        format!("{SELECT} Website LIKE '%{domain}%' LIMIT 1"),
        format!("{SELECT} Name = '{name}' LIMIT 1"),
    ]
}
