//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use enricher_core::{Enricher, ProgressReporter, RunSummary, normalize};
use enricher_shared::{AppConfig, init_config, load_config, validate_providers};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Enricher: fill in company spreadsheets from CRM and data providers.
#[derive(Parser)]
#[command(
    name = "enricher",
    version,
    about = "Enrich a spreadsheet of company URLs with metadata, CRM and relationship data.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich a CSV file with a `company_url` column.
    Enrich {
        /// Input spreadsheet (CSV).
        file: PathBuf,

        /// Write the report here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Also email the report to this address.
        #[arg(long)]
        email: Option<String>,
    },

    /// Print the canonical domain for each URL.
    Normalize {
        /// Raw URLs or domains.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "enricher=info",
        1 => "enricher=debug",
        _ => "enricher=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Enrich { file, out, email } => {
            cmd_enrich(&file, out.as_deref(), email.as_deref()).await
        }
        Command::Normalize { urls } => cmd_normalize(&urls),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_enrich(file: &Path, out: Option<&Path>, email: Option<&str>) -> Result<()> {
    // Validate endpoints and secrets before reading anything
    let config = load_config()?;
    validate_providers(&config)?;

    let input = std::fs::read(file)
        .wrap_err_with(|| format!("cannot read spreadsheet '{}'", file.display()))?;

    let enricher = Enricher::from_config(&config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    info!(file = %file.display(), emailed = email.is_some(), "enriching spreadsheet");

    let reporter = CliProgress::new();
    let result = enricher
        .enrich_spreadsheet(&input, email, &reporter, &cancel)
        .await;
    reporter.spinner.finish_and_clear();
    let output = result?;

    match out {
        Some(path) => std::fs::write(path, &output.csv)
            .wrap_err_with(|| format!("cannot write report '{}'", path.display()))?,
        None => std::io::stdout().write_all(&output.csv)?,
    }

    // Summary goes to stderr so stdout stays a clean CSV.
    let summary = &output.summary;
    eprintln!();
    eprintln!("  Enrichment finished.");
    eprintln!("  Rows:     {}", summary.rows);
    eprintln!("  Domains:  {}", summary.unique_domains);
    eprintln!("  Failed:   {}", summary.failed_domains);
    eprintln!(
        "  Cache:    {} hits / {} misses",
        summary.cache.hits, summary.cache.misses
    );
    if let Some(path) = out {
        eprintln!("  Report:   {}", path.display());
    }
    if let Some(email) = email {
        eprintln!("  Emailed:  {email}");
    }
    eprintln!("  Time:     {:.1}s", summary.elapsed.as_secs_f64());
    eprintln!();

    Ok(())
}

fn cmd_normalize(urls: &[String]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    for url in urls {
        let domain = normalize(url);
        if domain.as_str().is_empty() {
            return Err(eyre!("'{url}' normalizes to an empty domain"));
        }
        writeln!(stdout, "{domain}")?;
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn batch_completed(&self, completed: usize, total: usize) {
        self.spinner
            .set_message(format!("Enriching [{completed}/{total} batches]"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
