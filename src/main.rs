//! strata-quotes: strata insurance quote comparison.
//!
//! Entry point. Loads `.env` and configuration, initialises structured
//! logging and dispatches the `merge` and `report` subcommands.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use strata_quotes::config::AppConfig;
use strata_quotes::documents;
use strata_quotes::engine::batch::BatchDriver;
use strata_quotes::engine::projector;
use strata_quotes::llm::openai::OpenAiExtractor;
use strata_quotes::llm::QuoteExtractor;
use strata_quotes::money;
use strata_quotes::schema::QuoteSchema;
use strata_quotes::storage;
use strata_quotes::types::PricingParams;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file (built-in defaults if missing)
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge every quote document in a directory into the master record
    Merge {
        /// Directory holding .json extracts and .txt quote text
        dir: PathBuf,
        /// Existing master record to merge into
        #[arg(long)]
        base: Option<PathBuf>,
        /// Where to write the master record
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Price the master record and write the report data
    Report {
        /// Master record to read
        #[arg(short, long)]
        master: Option<PathBuf>,
        /// Where to write the report data
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        pricing: PricingArgs,
    },
}

/// Per-run overrides of the `[pricing]` config section.
#[derive(clap::Args)]
struct PricingArgs {
    #[arg(long)]
    broker_fee_pct: Option<Decimal>,
    #[arg(long)]
    commission_pct: Option<Decimal>,
    #[arg(long)]
    associate_split_pct: Option<Decimal>,
    /// Non-zero switches to a fixed broker fee
    #[arg(long)]
    fixed_broker_fee: Option<Decimal>,
    #[arg(long)]
    strata_manager: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "strata-quotes failed");
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = AppConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Merge { dir, base, output } => {
            let output = output.unwrap_or_else(|| cfg.storage.master_path.clone());
            merge(&cfg, &dir, base.as_deref(), &output).await
        }
        Commands::Report {
            master,
            output,
            pricing,
        } => {
            let master = master.unwrap_or_else(|| cfg.storage.master_path.clone());
            let output = output.unwrap_or_else(|| cfg.storage.report_path.clone());
            report(&cfg, &master, &output, pricing)
        }
    }
}

async fn merge(cfg: &AppConfig, dir: &Path, base: Option<&Path>, output: &Path) -> Result<()> {
    let schema = match &cfg.extraction.schema_path {
        Some(path) => QuoteSchema::load(path)?,
        None => QuoteSchema::builtin(),
    };

    let mut master = match base {
        Some(path) => storage::load_master(path)?
            .with_context(|| format!("Base master record not found: {}", path.display()))?,
        None => schema.base_record(),
    };

    let extractor = build_extractor(cfg)?;
    let paths = documents::discover(dir, &[output])?;

    let driver = BatchDriver::new(Arc::new(schema), extractor, cfg.batch.concurrency);
    let batch = driver.run(&mut master, paths).await;

    storage::save_master(&master, output)?;

    for failure in &batch.failed {
        warn!(
            path = %failure.path.display(),
            stage = ?failure.stage,
            error = %failure.error,
            "Skipped document"
        );
    }
    info!(
        run_id = %batch.run_id,
        merged = batch.merged.len(),
        failed = batch.failed.len(),
        output = %output.display(),
        "{master}"
    );
    Ok(())
}

fn report(cfg: &AppConfig, master_path: &Path, output: &Path, overrides: PricingArgs) -> Result<()> {
    let master = storage::load_master(master_path)?
        .with_context(|| format!("Master record not found: {}", master_path.display()))?;

    let params = pricing_params(cfg, overrides)?;
    let data = projector::project(&master, &params, &cfg.report_settings());
    storage::save_report(&data, output)?;

    for quote in &data.enriched {
        println!("{quote}");
    }
    match &data.recommended {
        Some(pick) => {
            println!(
                "Recommended: {} at {}",
                pick.insurer,
                money::format_currency(pick.final_total)
            );
        }
        None => warn!("No priced quote to recommend"),
    }

    info!(
        quotes = data.enriched.len(),
        mode = %params.fee_mode(),
        output = %output.display(),
        "Report data written"
    );
    Ok(())
}

fn pricing_params(cfg: &AppConfig, overrides: PricingArgs) -> Result<PricingParams> {
    let p = &cfg.pricing;
    let params = PricingParams::new(
        overrides.broker_fee_pct.unwrap_or(p.broker_fee_pct),
        overrides.commission_pct.unwrap_or(p.commission_pct),
        overrides.associate_split_pct.unwrap_or(p.associate_split_pct),
        overrides.fixed_broker_fee.unwrap_or(p.fixed_broker_fee),
        overrides
            .strata_manager
            .or_else(|| p.strata_manager.clone())
            .filter(|s| !s.trim().is_empty()),
    )?;
    Ok(params)
}

fn build_extractor(cfg: &AppConfig) -> Result<Option<Arc<dyn QuoteExtractor>>> {
    let Some(api_key) = cfg.api_key() else {
        warn!(
            env = %cfg.extraction.api_key_env,
            "No extraction API key configured, text documents will be skipped"
        );
        return Ok(None);
    };

    match cfg.extraction.provider.as_str() {
        "openai" => {
            info!(model = %cfg.extraction.model, "Using OpenAI extraction provider");
            let client = OpenAiExtractor::new(
                api_key,
                Some(cfg.extraction.model.clone()),
                Some(cfg.extraction.api_url.clone()),
                Some(cfg.extraction.max_tokens),
            )?;
            let extractor: Arc<dyn QuoteExtractor> = Arc::new(client);
            Ok(Some(extractor))
        }
        other => anyhow::bail!("Unknown extraction provider: {other}"),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "strata_quotes=debug" } else { "strata_quotes=info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let json_logging = std::env::var("STRATA_QUOTES_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
