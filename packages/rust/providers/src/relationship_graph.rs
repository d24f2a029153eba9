//! Relationship-graph client: paginated organization search.

use async_trait::async_trait;
use enricher_shared::{CanonicalDomain, RelationshipGraphConfig, Result, resolve_secret};
use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::http::{build_client, decode_json, transport_error};
use crate::records::{GraphOrganization, GraphPage};
use crate::retry::RetryPolicy;
use crate::{Lookup, ProviderKind, RelationshipGraphProvider};

pub struct HttpRelationshipGraphProvider {
    client: Client,
    url: String,
    api_key: String,
    page_size: u32,
    max_pages: u32,
    min_interaction_date: String,
    max_interaction_date: String,
    retry: RetryPolicy,
}

impl HttpRelationshipGraphProvider {
    pub fn new(config: &RelationshipGraphConfig, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config.url.clone(),
            api_key: resolve_secret(&config.api_key_env)?,
            page_size: config.page_size,
            max_pages: config.max_pages.max(1),
            min_interaction_date: config.min_interaction_date.clone(),
            max_interaction_date: config.max_interaction_date.clone(),
            retry,
        })
    }

    /// All organizations matching `term`, following continuation tokens
    /// until none is returned or the page limit is hit.
    #[instrument(skip_all, fields(term = %term))]
    pub async fn search_organizations(&self, term: &str) -> Result<Vec<GraphOrganization>> {
        let mut organizations = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 1..=self.max_pages {
            let result = self
                .retry
                .execute("relationship_graph.organizations", || {
                    self.page_once(term, page_token.as_deref())
                })
                .await?;

            organizations.extend(result.organizations);
            page_token = result.next_page_token.filter(|t| !t.is_empty());

            if page_token.is_none() {
                debug!(pages = page, total = organizations.len(), "organization search complete");
                return Ok(organizations);
            }
        }

        warn!(
            max_pages = self.max_pages,
            total = organizations.len(),
            "page limit reached, remaining pages skipped"
        );
        Ok(organizations)
    }

    async fn page_once(&self, term: &str, page_token: Option<&str>) -> Result<GraphPage> {
        let page_size = self.page_size.to_string();
        let mut params = vec![
            ("term", term),
            ("with_interaction_dates", "true"),
            ("with_interaction_persons", "true"),
            ("page_size", page_size.as_str()),
            ("min_last_email_date", self.min_interaction_date.as_str()),
            ("max_last_email_date", self.max_interaction_date.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("page_token", token));
        }

        let response = self
            .client
            .get(&self.url)
            .basic_auth("", Some(&self.api_key))
            .query(&params)
            .send()
            .await
            .map_err(|e| transport_error(&self.url, e))?;
        decode_json(ProviderKind::RelationshipGraph, &self.url, response).await
    }
}

#[async_trait]
impl RelationshipGraphProvider for HttpRelationshipGraphProvider {
    #[instrument(skip_all, fields(domain = %domain))]
    async fn fetch(&self, domain: &CanonicalDomain) -> Result<Lookup<GraphOrganization>> {
        let organizations = self.search_organizations(domain.as_str()).await?;
        Ok(Lookup::from_option(organizations.into_iter().next()))
    }
}
