//! `citescan scan` — crawl a list of publisher URLs and record evidence of
//! Prebid.js and companion ad-tech integrations.
//!
//! This binary is a thin `clap`-derived front end: it maps flags onto an
//! `Options` value and hands off to the Tracker/Planner/Supervisor. No
//! crawl logic lives here.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use citescan::config::{ExecutionMode, Options, RangeSpec};
use citescan::scheduler::CancelSignal;
use citescan::tracker::Tracker;
use citescan::{planner, supervisor, url_source};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "citescan", about = "Detects Prebid.js and companion ad-tech integrations across publisher websites")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a list of URLs and record ad-tech evidence.
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Local file of candidate URLs (.txt/.md/.csv/.json). Ignored when
    /// `--github-repo` is set.
    input_file: Option<PathBuf>,

    #[arg(long)]
    github_repo: Option<String>,
    #[arg(long, default_value_t = 100)]
    num_urls: usize,
    #[arg(long, default_value = "cluster")]
    puppeteer_type: String,
    #[arg(long, default_value_t = 5)]
    concurrency: usize,
    #[arg(long, default_value_t = true)]
    headless: bool,
    #[arg(long, default_value = "store")]
    output_dir: PathBuf,
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
    /// `N-M` or `N-`, 1-based and inclusive.
    #[arg(long)]
    range: Option<String>,
    #[arg(long, default_value_t = 0)]
    chunk_size: usize,
    #[arg(long)]
    skip_processed: bool,
    #[arg(long)]
    prefilter_processed: bool,
    #[arg(long)]
    force_reprocess: bool,
    #[arg(long)]
    reset_tracking: bool,
    #[arg(long)]
    batch_mode: bool,
    #[arg(long, default_value_t = 250)]
    batch_size: usize,
    #[arg(long)]
    total_urls: Option<usize>,
    #[arg(long, default_value_t = 1)]
    start_url: usize,
    #[arg(long)]
    resume_batch: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let Command::Scan(args) = &cli.command;
    let options = match build_options(args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("invalid options: {e:#}");
            return ExitCode::from(2);
        }
    };

    match run(options).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("citescan failed: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn build_options(args: &ScanArgs) -> Result<Options> {
    let builder = if let Some(repo) = &args.github_repo {
        Options::builder().remote_source(repo.clone())
    } else {
        let input = args.input_file.clone().unwrap_or_else(|| PathBuf::from("urls.txt"));
        Options::builder().local_source(input)
    };

    let mut builder = builder
        .output_dir(args.output_dir.clone())
        .log_dir(args.log_dir.clone())
        .max_urls(args.num_urls)
        .execution_mode(execution_mode(&args.puppeteer_type))
        .concurrency(args.concurrency)
        .headless(args.headless)
        .skip_processed(args.skip_processed)
        .prefilter_processed(args.prefilter_processed)
        .force_reprocess(args.force_reprocess)
        .reset_tracking(args.reset_tracking)
        .batch_mode(args.batch_mode)
        .batch_size(args.batch_size)
        .start_url(args.start_url)
        .chunk_size(args.chunk_size);

    if let Some(total) = args.total_urls {
        builder = builder.total_urls(total);
    }
    if let Some(resume) = args.resume_batch {
        builder = builder.resume_batch(resume);
    }
    if let Some(range_str) = &args.range {
        builder = builder.range(RangeSpec::parse(range_str)?);
    }

    builder.build()
}

fn execution_mode(puppeteer_type: &str) -> ExecutionMode {
    if puppeteer_type.eq_ignore_ascii_case("vanilla") {
        ExecutionMode::Sequential
    } else {
        ExecutionMode::Pooled
    }
}

async fn run(options: Options) -> Result<ExitCode> {
    let tracker = Tracker::open(&options.tracker_path, options.max_retries).await?;
    if options.reset_tracking {
        tracker.reset().await?;
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build the HTTP client used for remote URL ingestion")?;

    let ingested = url_source::ingest(&client, &options.source, options.max_urls, options.range).await?;
    if ingested.urls.is_empty() {
        println!("No URLs found");
        return Ok(ExitCode::SUCCESS);
    }

    let plan = planner::build_plan(&options, ingested.urls, &tracker).await?;
    if plan.chunks.is_empty() {
        println!("No URLs found");
        return Ok(ExitCode::SUCCESS);
    }

    tokio::fs::create_dir_all(&options.log_dir).await.ok();
    let start = options.start_url;
    let total = options.total_urls.unwrap_or_else(|| plan.total_urls());
    let progress_path = options.log_dir.join(supervisor::progress_file_name(start, start + total.saturating_sub(1)));

    let cancel = CancelSignal::new();
    let progress = supervisor::run_batch(&options, &plan, &tracker, &progress_path, &cancel).await?;

    println!(
        "citescan: {} URL(s) planned, {} chunk(s) completed, {} chunk(s) failed",
        plan.total_urls(),
        progress.completed_chunks.len(),
        progress.failed_chunks.len()
    );

    Ok(ExitCode::SUCCESS)
}
