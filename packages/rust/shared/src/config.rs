//! Application configuration for the enrichment pipeline.
//!
//! User config lives at `~/.enricher/enricher.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: it names the env var that holds them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EnricherError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "enricher.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".enricher";

// ---------------------------------------------------------------------------
// Config structs (matching enricher.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Batching, concurrency and retry defaults.
    #[serde(default)]
    pub pipeline: PipelineDefaults,

    /// Remote data providers.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Operator alerting.
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Report delivery.
    #[serde(default)]
    pub email: EmailConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefaults {
    /// Domains per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batches in flight at once.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Domains enriched concurrently inside one batch.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Additional attempts after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each subsequent retry.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_concurrency: default_batch_concurrency(),
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    80
}
fn default_batch_concurrency() -> usize {
    3
}
fn default_chunk_size() -> usize {
    20
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    300
}

/// `[providers]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub search_index: SearchIndexConfig,
    #[serde(default)]
    pub relationship_graph: RelationshipGraphConfig,
}

/// `[providers.metadata]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Endpoint accepting `{"websites": [...]}`.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_metadata_timeout")]
    pub timeout_secs: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_metadata_timeout(),
        }
    }
}

fn default_metadata_timeout() -> u64 {
    15
}

/// `[providers.crm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Batch endpoint accepting `{"companies": [...]}`.
    #[serde(default)]
    pub batch_url: String,

    #[serde(default = "default_crm_timeout")]
    pub timeout_secs: u64,

    /// Prefix for account links; the account id and `/view` are appended.
    #[serde(default)]
    pub account_link_base: String,

    /// REST query endpoint used for the domain/name fallback lookup.
    /// The fallback is skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_url: Option<String>,

    /// Name of the env var holding the bearer token for `query_url`.
    #[serde(default = "default_crm_token_env")]
    pub access_token_env: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            batch_url: String::new(),
            timeout_secs: default_crm_timeout(),
            account_link_base: String::new(),
            query_url: None,
            access_token_env: default_crm_token_env(),
        }
    }
}

fn default_crm_timeout() -> u64 {
    8
}
fn default_crm_token_env() -> String {
    "ENRICHER_CRM_TOKEN".into()
}

/// `[providers.search_index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndexConfig {
    /// Select handler URL of the search index.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_timeout() -> u64 {
    5
}

/// `[providers.relationship_graph]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipGraphConfig {
    /// Organizations search endpoint.
    #[serde(default)]
    pub url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_graph_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_graph_page_size")]
    pub page_size: u32,

    /// Upper bound on continuation pages followed per lookup.
    #[serde(default = "default_graph_max_pages")]
    pub max_pages: u32,

    #[serde(default = "default_min_interaction_date")]
    pub min_interaction_date: String,

    #[serde(default = "default_max_interaction_date")]
    pub max_interaction_date: String,

    /// Prefix for record links; the organization id is appended.
    #[serde(default)]
    pub record_link_base: String,
}

impl Default for RelationshipGraphConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key_env: default_graph_key_env(),
            timeout_secs: default_graph_timeout(),
            page_size: default_graph_page_size(),
            max_pages: default_graph_max_pages(),
            min_interaction_date: default_min_interaction_date(),
            max_interaction_date: default_max_interaction_date(),
            record_link_base: String::new(),
        }
    }
}

fn default_graph_key_env() -> String {
    "ENRICHER_GRAPH_API_KEY".into()
}
fn default_graph_timeout() -> u64 {
    10
}
fn default_graph_page_size() -> u32 {
    500
}
fn default_graph_max_pages() -> u32 {
    20
}
fn default_min_interaction_date() -> String {
    "2001-01-01T00:00:00".into()
}
fn default_max_interaction_date() -> String {
    "2034-01-12T23:59:59".into()
}

/// Which channel receives run-level failure alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationChannel {
    #[default]
    None,
    AlertWebhook,
    Chat,
}

/// `[notifications]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub channel: NotificationChannel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_webhook_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_webhook_url: Option<String>,

    /// Source label attached to every alert.
    #[serde(default = "default_origin")]
    pub origin: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            channel: NotificationChannel::None,
            alert_webhook_url: None,
            chat_webhook_url: None,
            origin: default_origin(),
        }
    }
}

fn default_origin() -> String {
    "enricher".into()
}

/// `[email]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Mail relay endpoint. Reports are not sent when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_subject")]
    pub subject: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            subject: default_subject(),
        }
    }
}

fn default_subject() -> String {
    "Your enriched company report is ready".into()
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Retry settings shared by every provider client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
}

/// Runtime scheduling configuration for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Domains per batch.
    pub batch_size: usize,
    /// Batches dispatched per wave.
    pub batch_concurrency: usize,
    /// Domains enriched concurrently inside a batch.
    pub chunk_size: usize,
    pub retry: RetryConfig,
}

impl PipelineConfig {
    /// Upper bound on simultaneously in-flight remote calls.
    pub fn max_in_flight(&self) -> usize {
        self.batch_concurrency * self.chunk_size
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_size: config.pipeline.batch_size.max(1),
            batch_concurrency: config.pipeline.batch_concurrency.max(1),
            chunk_size: config.pipeline.chunk_size.max(1),
            retry: RetryConfig {
                max_retries: config.pipeline.max_retries,
                initial_delay_ms: config.pipeline.initial_delay_ms,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.enricher/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EnricherError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.enricher/enricher.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EnricherError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        EnricherError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnricherError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EnricherError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnricherError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named by the config.
pub fn resolve_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(EnricherError::config(format!(
            "secret not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that every provider endpoint is configured and its secrets are present.
pub fn validate_providers(config: &AppConfig) -> Result<()> {
    let providers = &config.providers;
    let required = [
        ("providers.metadata.url", &providers.metadata.url),
        ("providers.crm.batch_url", &providers.crm.batch_url),
        ("providers.search_index.url", &providers.search_index.url),
        (
            "providers.relationship_graph.url",
            &providers.relationship_graph.url,
        ),
    ];

    for (key, value) in required {
        if value.trim().is_empty() {
            return Err(EnricherError::config(format!("{key} is not set")));
        }
    }

    resolve_secret(&providers.relationship_graph.api_key_env)?;

    if providers.crm.query_url.is_some() {
        resolve_secret(&providers.crm.access_token_env)?;
    }

    Ok(())
}
