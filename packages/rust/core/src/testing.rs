//! In-memory providers for scheduler and pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use enricher_providers::{
    AttributeRecord, CompanyRef, CrmAccount, CrmBatchResponse, CrmProvider, GraphOrganization,
    Lookup, MetadataProvider, Providers, RelationshipGraphProvider, SearchIndexProvider,
};
use enricher_shared::{CanonicalDomain, EnricherError, Result};
use serde_json::json;

/// One fake standing in for all four providers.
///
/// Every call sleeps for `latency` while counted as in flight, so paused-clock
/// tests can observe peak concurrency.
#[derive(Default)]
pub(crate) struct FakeProvider {
    pub latency: Duration,
    pub fail_metadata: bool,
    /// Domains whose search-index query is rejected as malformed.
    pub reject_search_for: HashSet<String>,
    /// Domains the CRM batch call leaves unmatched.
    pub unmatched_in_batch: HashSet<String>,
    /// Domains whose fallback CRM query finds an account.
    pub fallback_accounts: HashSet<String>,
    /// Domains whose fallback CRM query is rejected as malformed.
    pub reject_fallback_for: HashSet<String>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
    calls: Mutex<HashMap<(String, &'static str), usize>>,
}

impl FakeProvider {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn into_providers(self) -> (Arc<Self>, Providers) {
        let fake = Arc::new(self);
        let providers = Providers {
            metadata: fake.clone(),
            crm: fake.clone(),
            search_index: fake.clone(),
            relationship_graph: fake.clone(),
        };
        (fake, providers)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Calls made for `key` (a domain, or `"batch"`) to `provider`.
    pub fn calls_for(&self, key: &str, provider: &'static str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&(key.to_string(), provider))
            .copied()
            .unwrap_or(0)
    }

    async fn call(&self, key: &str, provider: &'static str) {
        *self
            .calls
            .lock()
            .unwrap()
            .entry((key.to_string(), provider))
            .or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn name_for(domain: &str) -> String {
    let stem = domain.split('.').next().unwrap_or(domain);
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
impl MetadataProvider for FakeProvider {
    async fn fetch_batch(
        &self,
        domains: &[CanonicalDomain],
    ) -> Result<HashMap<CanonicalDomain, Vec<AttributeRecord>>> {
        self.call("batch", "metadata").await;
        if self.fail_metadata {
            return Err(EnricherError::Network("metadata endpoint unreachable".into()));
        }
        Ok(domains
            .iter()
            .filter(|d| d.as_str().contains('.'))
            .map(|d| {
                let record = serde_json::from_value(json!({
                    "Name": [name_for(d.as_str())],
                    "Number_of_Employees": [120],
                    "Employees__12_Months_Ago": [100],
                }))
                .unwrap();
                (d.clone(), vec![record])
            })
            .collect())
    }
}

#[async_trait]
impl CrmProvider for FakeProvider {
    async fn fetch_batch(&self, companies: &[CompanyRef]) -> Result<CrmBatchResponse> {
        self.call("batch", "crm").await;
        let websites: serde_json::Map<String, serde_json::Value> = companies
            .iter()
            .filter(|c| !self.unmatched_in_batch.contains(&c.company_url))
            .map(|c| {
                (
                    c.company_url.clone(),
                    json!([{"Id": format!("001-{}", c.company_url), "Owner": {"Name": "Dana"}}]),
                )
            })
            .collect();
        Ok(serde_json::from_value(json!({
            "salesforce": {"websites": websites, "names": {}},
            "specter": [],
        }))
        .unwrap())
    }

    async fn find_account(
        &self,
        domain: &CanonicalDomain,
        _name: &str,
    ) -> Result<Lookup<CrmAccount>> {
        self.call(domain.as_str(), "crm-query").await;
        if self.reject_fallback_for.contains(domain.as_str()) {
            return Err(EnricherError::malformed("crm", "HTTP 400"));
        }
        if !self.fallback_accounts.contains(domain.as_str()) {
            return Ok(Lookup::NotFound);
        }
        let account = serde_json::from_value(json!({
            "Id": format!("001Q-{domain}"),
            "Owner": {"Name": "Quinn"},
        }))
        .unwrap();
        Ok(Lookup::Found(account))
    }
}

#[async_trait]
impl SearchIndexProvider for FakeProvider {
    async fn fetch(&self, domain: &CanonicalDomain) -> Result<Lookup<AttributeRecord>> {
        self.call(domain.as_str(), "search-index").await;
        if self.reject_search_for.contains(domain.as_str()) {
            return Err(EnricherError::malformed("search-index", "HTTP 400"));
        }
        Ok(Lookup::NotFound)
    }
}

#[async_trait]
impl RelationshipGraphProvider for FakeProvider {
    async fn fetch(&self, domain: &CanonicalDomain) -> Result<Lookup<GraphOrganization>> {
        self.call(domain.as_str(), "relationship-graph").await;
        Ok(Lookup::Found(GraphOrganization {
            id: Some(format!("g-{domain}")),
            ..GraphOrganization::default()
        }))
    }
}
