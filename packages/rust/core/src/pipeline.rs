//! End-to-end enrichment: spreadsheet bytes → normalize → schedule → merge → CSV.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use enricher_notify::{
    Alert, NoopNotifier, Notifier, ReportMailer, Severity, build_mailer, build_notifier,
};
use enricher_providers::Providers;
use enricher_shared::{
    AppConfig, CanonicalDomain, EnricherError, MergedCompany, PipelineConfig, Result,
};

use crate::assembler::{self, OutputRow};
use crate::cache::{CacheStats, ResponseCache};
use crate::merge::LinkBases;
use crate::normalize::normalize;
use crate::scheduler::Scheduler;

/// Label used for alerts raised by this pipeline.
const OPERATION: &str = "enrich_spreadsheet";

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Output rows written; always equals the input row count.
    pub rows: usize,
    /// Distinct non-empty domains that were enriched.
    pub unique_domains: usize,
    /// Domains that ended with an error row.
    pub failed_domains: usize,
    pub cache: CacheStats,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct EnrichOutput {
    /// The serialized report.
    pub csv: Vec<u8>,
    pub summary: RunSummary,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each scheduler wave with the number of batches finished.
    fn batch_completed(&self, completed: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_completed(&self, _completed: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Everything one process needs to run enrichments. Each call to
/// [`Enricher::enrich_spreadsheet`] gets its own cache and scheduler.
pub struct Enricher {
    providers: Providers,
    notifier: Arc<dyn Notifier>,
    mailer: Option<Arc<dyn ReportMailer>>,
    pipeline: PipelineConfig,
    links: LinkBases,
    origin: String,
}

impl Enricher {
    /// Build providers, notifier and mailer once from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            providers: Providers::from_config(config)?,
            notifier: build_notifier(&config.notifications)?,
            mailer: build_mailer(&config.email)?,
            pipeline: PipelineConfig::from(config),
            links: LinkBases::from(config),
            origin: config.notifications.origin.clone(),
        })
    }

    /// An enricher over explicit providers, with no alerting and no mailer.
    pub fn new(providers: Providers, pipeline: PipelineConfig, links: LinkBases) -> Self {
        Self {
            providers,
            notifier: Arc::new(NoopNotifier),
            mailer: None,
            pipeline,
            links,
            origin: "enricher".into(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn ReportMailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Run the full pipeline over an uploaded spreadsheet.
    ///
    /// On success the report is returned and, when `recipient` is given,
    /// handed to the mailer. A run-level failure other than cancellation is
    /// reported to the notifier before being returned.
    #[instrument(skip_all, fields(bytes = input.len(), emailed = recipient.is_some()))]
    pub async fn enrich_spreadsheet(
        &self,
        input: &[u8],
        recipient: Option<&str>,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<EnrichOutput> {
        if recipient.is_some() && self.mailer.is_none() {
            return Err(EnricherError::config(
                "a report recipient was given but [email] endpoint is not configured",
            ));
        }

        match self.run(input, recipient, progress, cancel).await {
            Ok(output) => Ok(output),
            Err(EnricherError::Cancelled) => Err(EnricherError::Cancelled),
            Err(e) => {
                self.raise_alert(&e, input.len(), recipient).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        input: &[u8],
        recipient: Option<&str>,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<EnrichOutput> {
        let start = Instant::now();

        // --- Phase 1: Ingest ---
        progress.phase("Reading spreadsheet");
        let records = assembler::parse_input(input)?;
        let domains: Vec<CanonicalDomain> = records.iter().map(|r| normalize(&r.raw_url)).collect();

        let mut seen = HashSet::new();
        let unique: Vec<CanonicalDomain> = domains
            .iter()
            .filter(|d| !d.as_str().is_empty() && seen.insert(*d))
            .cloned()
            .collect();
        info!(rows = records.len(), unique = unique.len(), "starting enrichment");

        // --- Phase 2: Enrich ---
        let cache = ResponseCache::new();
        let scheduler = Scheduler::new(&self.providers, &cache, &self.pipeline, &self.links, progress);
        let outcomes = scheduler.run(&unique, cancel).await?;

        // --- Phase 3: Assemble ---
        progress.phase("Writing report");
        let rows: Vec<OutputRow> = records
            .iter()
            .zip(domains)
            .map(|(record, domain)| {
                let company = match outcomes.get(&domain) {
                    Some(outcome) => outcome.company().clone(),
                    None => MergedCompany::unknown(domain),
                };
                assembler::assemble(record, company)
            })
            .collect();
        let csv = assembler::serialize(&rows)?;

        // --- Phase 4: Hand-off ---
        if let (Some(recipient), Some(mailer)) = (recipient, &self.mailer) {
            progress.phase("Sending report");
            mailer.send_report(recipient, &csv).await?;
        }

        let summary = RunSummary {
            rows: rows.len(),
            unique_domains: unique.len(),
            failed_domains: outcomes.values().filter(|o| o.is_failed()).count(),
            cache: cache.stats().await,
            elapsed: start.elapsed(),
        };
        progress.done(&summary);

        info!(
            rows = summary.rows,
            unique = summary.unique_domains,
            failed = summary.failed_domains,
            cache_hits = summary.cache.hits,
            cache_misses = summary.cache.misses,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "enrichment finished"
        );

        Ok(EnrichOutput { csv, summary })
    }

    async fn raise_alert(&self, error: &EnricherError, input_bytes: usize, recipient: Option<&str>) {
        let severity = match error {
            EnricherError::Validation { .. } | EnricherError::Parse { .. } => Severity::Warning,
            _ => Severity::Error,
        };
        let mut alert = Alert::error(&self.origin, OPERATION, error)
            .with_severity(severity)
            .with_context("input_bytes", input_bytes);
        if let Some(recipient) = recipient {
            alert = alert.with_context("recipient", recipient);
        }

        if let Err(e) = self.notifier.notify(&alert).await {
            warn!(error = %e, "failed to deliver alert");
        }
    }
}
