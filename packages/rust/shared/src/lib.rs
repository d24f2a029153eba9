//! Shared types, error model, and configuration for the enricher.
//!
//! This crate is the foundation depended on by all other enricher crates.
//! It provides:
//! - [`EnricherError`], the unified error type
//! - Domain types ([`CanonicalDomain`], [`FieldValue`], [`MergedCompany`], [`RowId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrmConfig, EmailConfig, MetadataConfig, NotificationChannel, NotificationsConfig,
    PipelineConfig, PipelineDefaults, ProvidersConfig, RelationshipGraphConfig, RetryConfig,
    SearchIndexConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_secret, validate_providers,
};
pub use error::{EnricherError, Result};
pub use types::{
    CanonicalDomain, ERROR_MARKER, FieldValue, InputRecord, MergedCompany, RowId, UNKNOWN_MARKER,
};
