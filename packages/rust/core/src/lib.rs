//! Core enrichment pipeline.
//!
//! This crate ties normalization, the per-run response cache, the batch
//! scheduler and the merge engine together into the end-to-end
//! [`Enricher::enrich_spreadsheet`] workflow.

pub mod assembler;
pub mod cache;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use assembler::{OUTPUT_COLUMNS, OutputRow, assemble, parse_input, serialize};
pub use cache::{CacheStats, ResponseCache};
pub use merge::{LinkBases, RawByProvider, merge};
pub use normalize::normalize;
pub use pipeline::{EnrichOutput, Enricher, ProgressReporter, RunSummary, SilentProgress};
pub use scheduler::{DomainOutcome, Scheduler, SchedulerPhase};
