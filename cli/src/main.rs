//! `skillscan` entry point.
//!
//! Two subcommands: `filter` classifies collected SKILL.md files against
//! the remote classifier, `export` turns the validated set into Parquet
//! files plus packaging metadata.
//!
//! Partial remote failures do not produce a non-zero exit code; inspect
//! the output database to judge completeness.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use skillscan_core::{FilterConfig, Strategy, run_filter};
use skillscan_export::{ExportConfig, run_export};

#[derive(Debug, Parser)]
#[command(name = "skillscan", version, about = "Build a validated SKILL.md dataset")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify collected SKILL.md files with the remote classifier
    Filter(FilterArgs),
    /// Export validated files to Parquet with repo metadata and history
    Export(ExportArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    /// One request per unique content unit, bounded concurrency
    Concurrent,
    /// Message Batches submit/poll convention (cheaper, slower)
    Batches,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Concurrent => Strategy::Concurrent,
            StrategyArg::Batches => Strategy::Batches,
        }
    }
}

#[derive(Debug, Parser)]
struct FilterArgs {
    /// Main database from the collector
    #[arg(long, default_value = "results/skills_v3.db")]
    main_db: PathBuf,

    /// Output database for validation results
    #[arg(long, default_value = "validation.db")]
    output_db: PathBuf,

    /// Content directory from the collector
    #[arg(long, default_value = "results/content")]
    content_dir: PathBuf,

    /// Verdict cache directory (default: ~/.cache/skillscan/claude)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Classifier model identifier
    #[arg(long)]
    model: Option<String>,

    /// Max concurrent API calls
    #[arg(long, default_value_t = 3)]
    max_concurrent: usize,

    /// Override the API base URL (e.g. a local compatible endpoint)
    #[arg(long)]
    api_base: Option<String>,

    /// API key (default: the ANTHROPIC_API_KEY environment variable)
    #[arg(long)]
    api_key: Option<String>,

    /// Calling convention
    #[arg(long, value_enum, default_value_t = StrategyArg::Concurrent)]
    strategy: StrategyArg,
}

#[derive(Debug, Parser)]
struct ExportArgs {
    /// Main database from the collector
    #[arg(long, default_value = "results/skills_v3.db")]
    main_db: PathBuf,

    /// Validation results database
    #[arg(long, default_value = "validation.db")]
    validation_db: PathBuf,

    /// Output directory
    #[arg(long, default_value = "build")]
    output_dir: PathBuf,

    /// Kaggle username for metadata generation
    #[arg(long)]
    kaggle_username: Option<String>,

    /// Export even when valid files lack repo metadata
    #[arg(long)]
    allow_no_repo: bool,

    /// Export even when valid files lack commit history
    #[arg(long)]
    allow_no_history: bool,
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".cache").join("skillscan").join("claude"))
        .unwrap_or_else(|| PathBuf::from(".cache/skillscan/claude"))
}

async fn run_filter_command(args: FilterArgs) -> anyhow::Result<()> {
    let mut config = FilterConfig::new(
        args.main_db,
        args.output_db,
        args.content_dir,
        args.cache_dir.unwrap_or_else(default_cache_dir),
    );
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(api_base) = args.api_base {
        config.api_base = api_base;
    }
    config.api_key = args.api_key;
    config.max_concurrent = args.max_concurrent;
    config.strategy = args.strategy.into();

    let summary = run_filter(&config).await?;

    println!(
        "Total: {}, already recorded: {}, no content yet: {}",
        summary.total, summary.already_recorded, summary.no_content
    );
    println!(
        "Frontmatter rejected: {}, cached: {}, unique submitted: {}, deduplicated: {}",
        summary.frontmatter_rejected, summary.cached, summary.submitted_units, summary.deduplicated
    );
    println!(
        "Results: {} valid, {} rejected, {} errors",
        summary.valid, summary.invalid, summary.errors
    );
    println!(
        "Output DB: {} ({} valid skill files)",
        config.output_db.display(),
        summary.files_rebuilt
    );
    Ok(())
}

fn run_export_command(args: ExportArgs) -> anyhow::Result<()> {
    let config = ExportConfig {
        main_db: args.main_db,
        validation_db: args.validation_db,
        output_dir: args.output_dir,
        kaggle_username: args.kaggle_username,
        allow_no_repo: args.allow_no_repo,
        allow_no_history: args.allow_no_history,
    };
    let summary = run_export(&config)?;
    println!(
        "Exported {} files, {} repos, {} history rows ({} valid URLs)",
        summary.files, summary.repos, summary.history_rows, summary.valid_urls
    );
    println!("Done: {}", config.output_dir.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Filter(args) => run_filter_command(args).await,
        Command::Export(args) => run_export_command(args),
    }
}
