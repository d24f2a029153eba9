//! Batch scheduler: bounded fan-out of per-domain enrichment.
//!
//! Unique domains are split into batches. Batches run in waves of at most
//! `batch_concurrency`; a wave must finish before the next is admitted. Each
//! batch makes one metadata call and one CRM call, then enriches its domains
//! in chunks of `chunk_size`, the domains of a chunk running concurrently.
//! A domain issues its own calls one after another, so at most
//! `batch_concurrency * chunk_size` remote calls are ever in flight.
//!
//! Results flow through a channel to a single collector. A failing domain
//! becomes an error record; a failing batch call aborts the run.

use std::collections::HashMap;

use enricher_providers::{
    CompanyRef, CrmBatchResponse, CrmRecord, Lookup, ProviderKind, ProviderRecord, Providers,
};
use enricher_shared::{CanonicalDomain, EnricherError, MergedCompany, PipelineConfig, Result};
use futures::future::{join_all, try_join_all};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::ResponseCache;
use crate::merge::{self, LinkBases, RawByProvider};
use crate::pipeline::ProgressReporter;

/// Scheduler lifecycle for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Partitioning,
    /// Batches are running, one wave at a time.
    Dispatching,
    /// All batches finished; the collector takes the last outcomes.
    Draining,
    Complete,
}

impl std::fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Partitioning => "Partitioning",
            Self::Dispatching => "Dispatching",
            Self::Draining => "Draining",
            Self::Complete => "Complete",
        };
        f.write_str(name)
    }
}

/// Result of enriching one domain.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainOutcome {
    Merged(MergedCompany),
    /// Enrichment failed; `company` carries identifying fields and error markers.
    Failed { company: MergedCompany, error: String },
}

impl DomainOutcome {
    pub fn company(&self) -> &MergedCompany {
        match self {
            Self::Merged(company) | Self::Failed { company, .. } => company,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

type Outcomes = HashMap<CanonicalDomain, DomainOutcome>;

pub struct Scheduler<'a> {
    providers: &'a Providers,
    cache: &'a ResponseCache,
    config: &'a PipelineConfig,
    links: &'a LinkBases,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        providers: &'a Providers,
        cache: &'a ResponseCache,
        config: &'a PipelineConfig,
        links: &'a LinkBases,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            providers,
            cache,
            config,
            links,
            progress,
        }
    }

    fn enter(&self, phase: SchedulerPhase) {
        debug!(%phase, "scheduler phase");
        self.progress.phase(&phase.to_string());
    }

    /// Enrich every domain, returning one outcome per domain.
    ///
    /// `domains` should be free of duplicates. Cancelling `cancel` drops all
    /// in-flight calls and retry waits and returns [`EnricherError::Cancelled`].
    #[instrument(skip_all, fields(domains = domains.len()))]
    pub async fn run(
        &self,
        domains: &[CanonicalDomain],
        cancel: &CancellationToken,
    ) -> Result<Outcomes> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("run cancelled");
                Err(EnricherError::Cancelled)
            }
            result = self.run_waves(domains) => result,
        }
    }

    async fn run_waves(&self, domains: &[CanonicalDomain]) -> Result<Outcomes> {
        self.enter(SchedulerPhase::Partitioning);
        let batches: Vec<&[CanonicalDomain]> = domains.chunks(self.config.batch_size).collect();
        let total_batches = batches.len();
        info!(
            batches = total_batches,
            batch_size = self.config.batch_size,
            batch_concurrency = self.config.batch_concurrency,
            chunk_size = self.config.chunk_size,
            "partitioned domains"
        );

        let (tx, mut rx) = mpsc::channel::<(CanonicalDomain, DomainOutcome)>(self.config.chunk_size);

        let dispatch = async move {
            self.enter(SchedulerPhase::Dispatching);
            let mut completed = 0;
            for (wave, group) in batches.chunks(self.config.batch_concurrency).enumerate() {
                debug!(wave, batches = group.len(), "wave admitted");
                try_join_all(group.iter().map(|batch| self.run_batch(batch, &tx))).await?;

                completed += group.len();
                self.progress.batch_completed(completed, total_batches);
                debug!(wave, completed, "wave finished");
            }
            // Every batch is done; dropping the sender lets the collector finish.
            drop(tx);
            self.enter(SchedulerPhase::Draining);
            Ok::<_, EnricherError>(())
        };

        let collect = async {
            let mut outcomes = Outcomes::with_capacity(domains.len());
            while let Some((domain, outcome)) = rx.recv().await {
                outcomes.insert(domain, outcome);
            }
            outcomes
        };

        let (dispatched, outcomes) = tokio::join!(dispatch, collect);
        dispatched?;

        self.enter(SchedulerPhase::Complete);
        let failed = outcomes.values().filter(|o| o.is_failed()).count();
        info!(domains = outcomes.len(), failed, "enrichment complete");
        Ok(outcomes)
    }

    #[instrument(skip_all, fields(batch = batch.len()))]
    async fn run_batch(
        &self,
        batch: &[CanonicalDomain],
        tx: &mpsc::Sender<(CanonicalDomain, DomainOutcome)>,
    ) -> Result<()> {
        let metadata = self.providers.metadata.fetch_batch(batch).await?;

        let mut names = Vec::with_capacity(batch.len());
        for domain in batch {
            let records = metadata
                .get(domain)
                .filter(|records| !records.is_empty())
                .cloned();
            names.push(merge::company_name(records.as_deref().unwrap_or_default(), domain));
            let outcome = Lookup::from_option(records.map(ProviderRecord::Metadata));
            self.cache.put(domain, ProviderKind::Metadata, outcome).await;
        }

        let companies: Vec<CompanyRef> = batch
            .iter()
            .zip(&names)
            .map(|(domain, name)| CompanyRef {
                company_url: domain.to_string(),
                company_name: name.clone(),
            })
            .collect();
        let crm = self.providers.crm.fetch_batch(&companies).await?;

        let work: Vec<(&CanonicalDomain, &str)> =
            batch.iter().zip(names.iter().map(String::as_str)).collect();

        for chunk in work.chunks(self.config.chunk_size) {
            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|(domain, name)| self.enrich_domain(domain, name, &crm)),
            )
            .await;

            for ((domain, _), outcome) in chunk.iter().zip(outcomes) {
                tx.send(((*domain).clone(), outcome))
                    .await
                    .map_err(|_| EnricherError::Cancelled)?;
            }
        }
        Ok(())
    }

    /// Bulkhead: any error becomes a failed outcome for this domain only.
    async fn enrich_domain(
        &self,
        domain: &CanonicalDomain,
        name: &str,
        crm: &CrmBatchResponse,
    ) -> DomainOutcome {
        match self.try_enrich_domain(domain, name, crm).await {
            Ok(company) => DomainOutcome::Merged(company),
            Err(e) => {
                warn!(%domain, error = %e, "domain enrichment failed");
                DomainOutcome::Failed {
                    company: MergedCompany::failed(domain.clone(), Some(name)),
                    error: e.to_string(),
                }
            }
        }
    }

    #[instrument(skip_all, fields(domain = %domain))]
    async fn try_enrich_domain(
        &self,
        domain: &CanonicalDomain,
        name: &str,
        crm: &CrmBatchResponse,
    ) -> Result<MergedCompany> {
        let mut raw = RawByProvider::default();

        if let Some(Lookup::Found(ProviderRecord::Metadata(records))) =
            self.cache.get(domain, ProviderKind::Metadata).await
        {
            raw.metadata = records;
        }

        let crm_lookup = self
            .cache
            .get_or_fetch(domain, ProviderKind::Crm, || async {
                // Website match outranks a name match; only a miss on both queries the CRM.
                let account = match crm.account_for(domain.as_str(), name) {
                    Some(account) => Some(account.clone()),
                    None => self.providers.crm.find_account(domain, name).await?.found(),
                };
                let profile = crm.profile_for(name).cloned();
                let found = account.is_some() || profile.is_some();
                Ok(Lookup::from_option(
                    found.then_some(ProviderRecord::Crm(CrmRecord { account, profile })),
                ))
            })
            .await?;
        if let Lookup::Found(ProviderRecord::Crm(record)) = crm_lookup {
            raw.crm = record;
        }

        if merge::needs_search_index(domain, &raw, self.links) {
            let lookup = self
                .cache
                .get_or_fetch(domain, ProviderKind::SearchIndex, || async {
                    let doc = self.providers.search_index.fetch(domain).await?;
                    Ok(doc.map(ProviderRecord::SearchIndex))
                })
                .await?;
            if let Lookup::Found(ProviderRecord::SearchIndex(doc)) = lookup {
                raw.search_index = Some(doc);
            }
        }

        let lookup = self
            .cache
            .get_or_fetch(domain, ProviderKind::RelationshipGraph, || async {
                let org = self.providers.relationship_graph.fetch(domain).await?;
                Ok(org.map(ProviderRecord::RelationshipGraph))
            })
            .await?;
        if let Lookup::Found(ProviderRecord::RelationshipGraph(org)) = lookup {
            raw.relationship_graph = Some(org);
        }

        Ok(merge::merge(domain, &raw, self.links))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use enricher_shared::{FieldValue, RetryConfig};

    use super::*;
    use crate::pipeline::{RunSummary, SilentProgress};
    use crate::testing::FakeProvider;

    fn config(batch_size: usize, batch_concurrency: usize, chunk_size: usize) -> PipelineConfig {
        PipelineConfig {
            batch_size,
            batch_concurrency,
            chunk_size,
            retry: RetryConfig {
                max_retries: 0,
                initial_delay_ms: 1,
            },
        }
    }

    fn domains(n: usize) -> Vec<CanonicalDomain> {
        (0..n)
            .map(|i| CanonicalDomain::from_normalized(format!("company{i}.com")))
            .collect()
    }

    fn links() -> LinkBases {
        LinkBases {
            crm_account: "https://crm.example.com/Account".into(),
            relationship_graph: "https://graph.example.com/companies".into(),
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.events.lock().unwrap().push(name.to_string());
        }

        fn batch_completed(&self, completed: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("batch {completed}/{total}"));
        }

        fn done(&self, _summary: &RunSummary) {}
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_calls_never_exceed_bound() {
        let (fake, providers) = FakeProvider::new(Duration::from_millis(10)).into_providers();
        let cache = ResponseCache::new();
        let config = config(80, 3, 20);
        let links = links();
        let scheduler = Scheduler::new(&providers, &cache, &config, &links, &SilentProgress);

        let input = domains(500);
        let outcomes = scheduler
            .run(&input, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 500);
        assert!(outcomes.values().all(|o| !o.is_failed()));
        assert!(
            fake.peak_in_flight() <= config.max_in_flight(),
            "peak {} exceeds {}",
            fake.peak_in_flight(),
            config.max_in_flight()
        );
        // Fan-out actually happened across batches and chunks.
        assert!(fake.peak_in_flight() > 20);
        // 7 batches: one metadata and one CRM call each.
        assert_eq!(fake.calls_for("batch", "metadata"), 7);
        assert_eq!(fake.calls_for("batch", "crm"), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn merged_outcome_uses_every_provider() {
        let (fake, providers) = FakeProvider::new(Duration::from_millis(1)).into_providers();
        let cache = ResponseCache::new();
        let config = config(80, 3, 20);
        let links = links();
        let scheduler = Scheduler::new(&providers, &cache, &config, &links, &SilentProgress);

        let acme = CanonicalDomain::from_normalized("acme.com");
        let outcomes = scheduler
            .run(std::slice::from_ref(&acme), &CancellationToken::new())
            .await
            .unwrap();

        let company = outcomes[&acme].company();
        assert_eq!(company.company_name.as_known(), Some("Acme"));
        assert_eq!(
            company.crm_account_link.as_known(),
            Some("https://crm.example.com/Account/001-acme.com/view")
        );
        assert_eq!(company.crm_account_owner.as_known(), Some("Dana"));
        assert_eq!(
            company.crm_record_link.as_known(),
            Some("https://graph.example.com/companies/g-acme.com")
        );
        assert_eq!(company.employee_growth_rate.as_known(), Some("20.00"));

        // The batch matched an account, so no fallback query was made.
        assert_eq!(fake.calls_for("acme.com", "crm-query"), 0);
        assert_eq!(fake.calls_for("acme.com", "search-index"), 1);
        assert_eq!(fake.calls_for("acme.com", "relationship-graph"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_domain_falls_back_to_crm_query() {
        let mut fake = FakeProvider::new(Duration::from_millis(1));
        fake.unmatched_in_batch.insert("acme.com".into());
        fake.fallback_accounts.insert("acme.com".into());
        let (fake, providers) = fake.into_providers();
        let cache = ResponseCache::new();
        let config = config(80, 3, 20);
        let links = links();
        let scheduler = Scheduler::new(&providers, &cache, &config, &links, &SilentProgress);

        let acme = CanonicalDomain::from_normalized("acme.com");
        let globex = CanonicalDomain::from_normalized("globex.io");
        let outcomes = scheduler
            .run(&[acme.clone(), globex.clone()], &CancellationToken::new())
            .await
            .unwrap();

        let company = outcomes[&acme].company();
        assert_eq!(
            company.crm_account_link.as_known(),
            Some("https://crm.example.com/Account/001Q-acme.com/view")
        );
        assert_eq!(company.crm_account_owner.as_known(), Some("Quinn"));
        assert_eq!(fake.calls_for("acme.com", "crm-query"), 1);

        let company = outcomes[&globex].company();
        assert_eq!(company.crm_account_owner.as_known(), Some("Dana"));
        assert_eq!(fake.calls_for("globex.io", "crm-query"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_crm_query_fails_only_that_domain() {
        let mut fake = FakeProvider::new(Duration::from_millis(1));
        fake.unmatched_in_batch.insert("company1.com".into());
        fake.unmatched_in_batch.insert("company2.com".into());
        fake.fallback_accounts.insert("company1.com".into());
        fake.reject_fallback_for.insert("company2.com".into());
        let (fake, providers) = fake.into_providers();
        let cache = ResponseCache::new();
        let config = config(80, 3, 20);
        let links = links();
        let scheduler = Scheduler::new(&providers, &cache, &config, &links, &SilentProgress);

        let input = domains(4);
        let outcomes = scheduler
            .run(&input, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 4);
        let failed = &outcomes[&input[2]];
        assert!(failed.is_failed());
        assert_eq!(failed.company().company_name.as_known(), Some("Company2"));
        assert_eq!(failed.company().crm_account_owner, FieldValue::Error);
        // Lookups after the CRM are skipped for the failed domain.
        assert_eq!(fake.calls_for("company2.com", "relationship-graph"), 0);

        assert_eq!(
            outcomes[&input[1]].company().crm_account_owner.as_known(),
            Some("Quinn")
        );
        assert_eq!(
            outcomes[&input[0]].company().crm_account_owner.as_known(),
            Some("Dana")
        );
        assert!(!outcomes[&input[3]].is_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn phases_follow_run_lifecycle() {
        let (_fake, providers) = FakeProvider::new(Duration::from_millis(1)).into_providers();
        let cache = ResponseCache::new();
        let config = config(4, 1, 2);
        let links = links();
        let progress = RecordingProgress::default();
        let scheduler = Scheduler::new(&providers, &cache, &config, &links, &progress);

        scheduler
            .run(&domains(10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            *progress.events.lock().unwrap(),
            [
                "Partitioning",
                "Dispatching",
                "batch 1/3",
                "batch 2/3",
                "batch 3/3",
                "Draining",
                "Complete",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_domain_does_not_abort_siblings() {
        let mut fake = FakeProvider::new(Duration::from_millis(1));
        fake.reject_search_for.insert("company3.com".into());
        let (_fake, providers) = fake.into_providers();
        let cache = ResponseCache::new();
        let config = config(4, 2, 2);
        let links = links();
        let scheduler = Scheduler::new(&providers, &cache, &config, &links, &SilentProgress);

        let input = domains(10);
        let outcomes = scheduler
            .run(&input, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 10);
        let failed: Vec<_> = outcomes.iter().filter(|(_, o)| o.is_failed()).collect();
        assert_eq!(failed.len(), 1);

        let (domain, outcome) = failed[0];
        assert_eq!(domain.as_str(), "company3.com");
        let company = outcome.company();
        assert_eq!(company.company_website.as_known(), Some("company3.com"));
        assert_eq!(company.company_name.as_known(), Some("Company3"));
        assert_eq!(company.description, FieldValue::Error);
        assert_eq!(company.last_email_date, FieldValue::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_call_failure_aborts_run() {
        let mut fake = FakeProvider::new(Duration::from_millis(1));
        fake.fail_metadata = true;
        let (_fake, providers) = fake.into_providers();
        let cache = ResponseCache::new();
        let config = config(80, 3, 20);
        let links = links();
        let scheduler = Scheduler::new(&providers, &cache, &config, &links, &SilentProgress);

        let err = scheduler
            .run(&domains(3), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EnricherError::Network(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_in_flight_work() {
        let (fake, providers) = FakeProvider::new(Duration::from_secs(3600)).into_providers();
        let cache = ResponseCache::new();
        let config = config(80, 3, 20);
        let links = links();
        let scheduler = Scheduler::new(&providers, &cache, &config, &links, &SilentProgress);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let err = scheduler.run(&domains(5), &cancel).await.unwrap_err();

        assert!(matches!(err, EnricherError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(3600));
        // Only the first metadata call was ever started.
        assert_eq!(fake.total_calls(), 1);
    }
}
