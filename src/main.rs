//! # Scholarship Research Agent
//!
//! Collects structured scholarship records by iterative web research.
//!
//! For every scholarship in the input list the agent:
//! 1. Runs a broad Tavily search
//! 2. Asks the LLM to fill a draft and list what is still missing
//! 3. Drills down on the gaps until nothing is missing or a budget runs out
//! 4. Writes a Markdown report and flattens it into one English record
//!
//! ## Quick Start
//! ```bash
//! TAVILY_API_KEY_1=... GOOGLE_API_KEY_1=... cargo run -- --level master --start 0 --end 10
//! cargo run -- "Chevening Scholarship" "Fulbright Program"
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use scholarship_research_agent::{
    load_targets, slice_targets, BatchRunner, CompletionClient, HarvestConfig, PersistenceSink,
    ResearchOrchestrator, RigCompletionBackend, RotatingCredentials, RunSummary,
    ScholarshipLevel, TavilySearchClient, TARGET_COLUMN,
};

/// Environment prefix of the Tavily key pool
const TAVILY_KEY_PREFIX: &str = "TAVILY_API_KEY";

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "scholarship-research-agent",
    version,
    about = "Researches scholarships on the web and writes structured records",
    long_about = r#"
Scholarship Research Agent

Reads scholarship names from data/final_input/{Level}_raw.csv (column
Scholarship_Name), researches each one with Tavily search and an LLM, and
writes four stores per level under OUTPUT_DIR:

  rag_database_{level}.jsonl                 raw evidence, appended
  scholarship_reports_{level}.json           draft records by name
  text_reports_{level}.json                  Markdown reports by name
  structured_english_reports_{level}.json    flat English records

KEYS:
  TAVILY_API_KEY_1, TAVILY_API_KEY_2, ...    (or TAVILY_API_KEY)
  GOOGLE_API_KEY_1, GOOGLE_API_KEY_2, ...    (or OPENAI_/ANTHROPIC_ per LLM_PROVIDER)

EXAMPLES:
  # Rows 0-49 of the master list
  scholarship-research-agent --level master --start 0 --end 50

  # Specific scholarships, bypassing the CSV
  scholarship-research-agent "Chevening Scholarship" "DAAD EPOS"
"#
)]
struct Args {
    /// Scholarships to research instead of the CSV list
    #[arg(value_name = "SCHOLARSHIP")]
    targets: Vec<String>,

    /// Scholarship level (master, bachelor, phd)
    #[arg(short = 'l', long = "level", env = "SCHOLARSHIP_LEVEL")]
    level: Option<ScholarshipLevel>,

    /// Input CSV (defaults to {INPUT_DIR}/{Level}_raw.csv)
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// First row to process (0-based)
    #[arg(long = "start", default_value_t = 0)]
    start: usize,

    /// Row to stop before (exclusive)
    #[arg(long = "end")]
    end: Option<usize>,

    /// Targets researched concurrently (overrides PARALLEL_WORKERS)
    #[arg(short = 'b', long = "batch-size")]
    batch_size: Option<usize>,

    /// Enable verbose/debug logging
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    let mut config = HarvestConfig::from_env().context("Failed to load configuration")?;
    if let Some(level) = args.level {
        config.level = level;
    }
    if let Some(batch_size) = args.batch_size {
        config.parallel_workers = batch_size;
    }
    config.validate()?;

    info!(
        level = %config.level,
        provider = %config.llm_provider,
        model = %config.model(),
        workers = config.parallel_workers,
        max_iterations = config.budget.max_iterations,
        max_api_calls = config.budget.max_api_calls,
        "Configuration loaded"
    );

    let targets = resolve_targets(&args, &config)?;
    if targets.is_empty() {
        warn!("No scholarships to research");
        return Ok(());
    }

    let runner = build_runner(&config)?;
    let summary = runner.run_all(&targets, config.parallel_workers).await;

    print_summary(&summary);

    if summary.total_succeeded() == 0 && summary.total_failed() > 0 {
        anyhow::bail!("All {} scholarships failed", summary.total_failed());
    }
    Ok(())
}

/// Positional targets, or the configured CSV window
fn resolve_targets(args: &Args, config: &HarvestConfig) -> Result<Vec<String>> {
    if !args.targets.is_empty() {
        return Ok(args.targets.clone());
    }

    let input = args.input.clone().unwrap_or_else(|| config.input_path());
    let all = load_targets(&input, TARGET_COLUMN)?;
    let window = slice_targets(&all, args.start, args.end).to_vec();

    info!(
        input = %input.display(),
        total = all.len(),
        selected = window.len(),
        start = args.start,
        "Targets loaded"
    );
    Ok(window)
}

/// Wire clients, orchestrator and sink from the configuration
fn build_runner(config: &HarvestConfig) -> Result<BatchRunner> {
    let search_keys = RotatingCredentials::from_env(TAVILY_KEY_PREFIX)
        .context("Tavily API keys are required")?;
    let llm_keys = RotatingCredentials::from_env(config.llm_provider.key_prefix())
        .with_context(|| format!("{} API keys are required", config.llm_provider))?;

    info!(
        search_keys = search_keys.len(),
        llm_keys = llm_keys.len(),
        "Credential pools loaded"
    );

    let search = TavilySearchClient::new(Arc::new(search_keys))
        .with_base_url(config.tavily_base_url.clone())
        .with_rotation_policy(config.rotation_policy());

    let backend = RigCompletionBackend::new(config.llm_provider, config.model())
        .with_temperature(config.llm_temperature);
    let completion = CompletionClient::new(Arc::new(backend), Arc::new(llm_keys))
        .with_rotation_policy(config.rotation_policy());

    let orchestrator = ResearchOrchestrator::new(Arc::new(search), Arc::new(completion))
        .with_budget(config.budget.clone());
    let sink = PersistenceSink::new(config.persistence_paths());

    Ok(BatchRunner::new(Arc::new(orchestrator), sink))
}

fn print_summary(summary: &RunSummary) {
    println!("\n{}", "=".repeat(60));
    println!("RUN SUMMARY");
    println!("{}", "=".repeat(60));

    for batch in &summary.batches {
        println!(
            "Batch {}: {} succeeded, {} failed",
            batch.index + 1,
            batch.succeeded.len(),
            batch.failed.len()
        );
        if let Some(e) = &batch.persistence_error {
            println!("  persistence failed: {}", e);
        }
    }

    println!(
        "\nTotal: {} succeeded, {} failed",
        summary.total_succeeded(),
        summary.total_failed()
    );
    for failure in summary.failures() {
        println!("  - {}: {}", failure.target_id, failure.error);
    }
    println!("{}", "=".repeat(60));
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// `--verbose` forces debug, otherwise `RUST_LOG` or info.
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
