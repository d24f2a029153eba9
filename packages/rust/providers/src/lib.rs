//! Remote data providers queried during enrichment.
//!
//! Each provider sits behind an async trait so the scheduler can be driven by
//! the HTTP clients in production and by in-memory fakes in tests. Every HTTP
//! client wraps its calls in the [`RetryPolicy`] executor and carries its own
//! request timeout.

mod crm;
mod http;
mod metadata;
pub mod records;
mod relationship_graph;
pub mod retry;
mod search_index;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use enricher_shared::{AppConfig, CanonicalDomain, PipelineConfig, Result};
use serde::Serialize;

pub use crm::{HttpCrmProvider, escape_soql, lookup_queries};
pub use metadata::HttpMetadataProvider;
pub use records::{AttributeRecord, CrmAccount, CrmBatchResponse, GraphOrganization};
pub use relationship_graph::HttpRelationshipGraphProvider;
pub use retry::RetryPolicy;
pub use search_index::HttpSearchIndexProvider;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Final outcome of a lookup. `NotFound` is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }

    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            Self::NotFound => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(v) => Lookup::Found(f(v)),
            Self::NotFound => Lookup::NotFound,
        }
    }
}

/// Which provider a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Metadata,
    Crm,
    SearchIndex,
    RelationshipGraph,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Metadata => "metadata",
            Self::Crm => "crm",
            Self::SearchIndex => "search-index",
            Self::RelationshipGraph => "relationship-graph",
        };
        f.write_str(name)
    }
}

/// CRM data for one company: the matched account and the richer profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrmRecord {
    pub account: Option<CrmAccount>,
    pub profile: Option<AttributeRecord>,
}

/// Raw provider-shaped payload for one (domain, provider) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderRecord {
    /// Every metadata record returned for the domain.
    Metadata(Vec<AttributeRecord>),
    Crm(CrmRecord),
    SearchIndex(AttributeRecord),
    RelationshipGraph(GraphOrganization),
}

/// Company identity sent to the CRM batch endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyRef {
    pub company_url: String,
    pub company_name: String,
}

// ---------------------------------------------------------------------------
// Provider traits
// ---------------------------------------------------------------------------

/// Batch metadata lookup: domains in, records keyed by domain out.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn fetch_batch(
        &self,
        domains: &[CanonicalDomain],
    ) -> Result<HashMap<CanonicalDomain, Vec<AttributeRecord>>>;
}

#[async_trait]
pub trait CrmProvider: Send + Sync {
    /// Website-keyed and name-keyed accounts plus company profiles.
    async fn fetch_batch(&self, companies: &[CompanyRef]) -> Result<CrmBatchResponse>;

    /// Fallback account lookup by domain variants, then by exact name.
    async fn find_account(&self, domain: &CanonicalDomain, name: &str)
    -> Result<Lookup<CrmAccount>>;
}

#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// First document whose website matches the domain.
    async fn fetch(&self, domain: &CanonicalDomain) -> Result<Lookup<AttributeRecord>>;
}

#[async_trait]
pub trait RelationshipGraphProvider: Send + Sync {
    /// First organization matching the domain, with interaction dates.
    async fn fetch(&self, domain: &CanonicalDomain) -> Result<Lookup<GraphOrganization>>;
}

/// The full provider set for one process.
#[derive(Clone)]
pub struct Providers {
    pub metadata: Arc<dyn MetadataProvider>,
    pub crm: Arc<dyn CrmProvider>,
    pub search_index: Arc<dyn SearchIndexProvider>,
    pub relationship_graph: Arc<dyn RelationshipGraphProvider>,
}

impl Providers {
    /// Build the HTTP clients once from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let retry = RetryPolicy::from(PipelineConfig::from(config).retry);
        let providers = &config.providers;

        Ok(Self {
            metadata: Arc::new(HttpMetadataProvider::new(&providers.metadata, retry)?),
            crm: Arc::new(HttpCrmProvider::new(&providers.crm, retry)?),
            search_index: Arc::new(HttpSearchIndexProvider::new(
                &providers.search_index,
                retry,
            )?),
            relationship_graph: Arc::new(HttpRelationshipGraphProvider::new(
                &providers.relationship_graph,
                retry,
            )?),
        })
    }
}
