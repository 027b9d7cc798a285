//! Ingest Lane CLI
//!
//! Entry point for the `ingest-lane` command-line tool.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use globset::Glob;
use walkdir::WalkDir;

use ingest_lane::api::{CurlTransport, Payload};
use ingest_lane::batch::{BatchConfig, BatchItem, BatchRunner};
use ingest_lane::breaker::CircuitBreaker;
use ingest_lane::cancel::CancellationToken;
use ingest_lane::client::JobClient;
use ingest_lane::config::LaneConfig;
use ingest_lane::error::ErrorKind;
use ingest_lane::limiter::{RateLimiter, TokenBucket};
use ingest_lane::signal::SignalHandler;

#[derive(Parser)]
#[command(name = "ingest-lane")]
#[command(about = "Resilient batch client for a hosted image-extraction API", version)]
struct Cli {
    /// Path to config file (default: ingest-lane.toml if present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one image and wait for its extraction result
    Submit {
        /// Pattern to ingest against
        #[arg(long)]
        pattern: String,

        /// Image file to upload inline
        #[arg(required_unless_present = "url", conflicts_with = "url")]
        image: Option<PathBuf>,

        /// Public image URL instead of a local file
        #[arg(long)]
        url: Option<String>,

        /// Print the job id immediately instead of polling
        #[arg(long)]
        no_poll: bool,

        /// Overall deadline in seconds
        #[arg(long)]
        max_wait: Option<u64>,
    },

    /// Read the current status of a job
    Status {
        /// Job ID to look up
        job_id: String,
    },

    /// Ingest every image under a directory
    Batch {
        /// Pattern to ingest against
        #[arg(long)]
        pattern: String,

        /// Directory to scan for images
        dir: PathBuf,

        /// Glob filter on file names (e.g. "*.jpg")
        #[arg(long)]
        include: Option<String>,

        /// Maximum in-flight items
        #[arg(long)]
        concurrency: Option<usize>,

        /// Submit everything first, then poll everything
        #[arg(long)]
        two_phase: bool,

        /// Where to write the JSON report
        #[arg(long, default_value = "batch_report.json")]
        report: PathBuf,
    },
}

fn main() {
    process::exit(run());
}

fn run() -> i32 {
    let cli = Cli::parse();

    let config = match LaneConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ingest-lane: {}", e);
            return 2;
        }
    };

    match cli.command {
        Commands::Submit {
            pattern,
            image,
            url,
            no_poll,
            max_wait,
        } => cmd_submit(&config, &pattern, image, url, no_poll, max_wait),
        Commands::Status { job_id } => cmd_status(&config, &job_id),
        Commands::Batch {
            pattern,
            dir,
            include,
            concurrency,
            two_phase,
            report,
        } => cmd_batch(&config, &pattern, &dir, include, concurrency, two_phase, &report),
    }
}

/// Build a client with the configured transport, limiter and breaker
fn build_client(config: &LaneConfig, pattern: &str) -> JobClient {
    let transport = Arc::new(CurlTransport::new(config.curl_config()));
    let limiter: Arc<dyn RateLimiter> = Arc::new(TokenBucket::new(
        config.rate_limit.capacity,
        config.rate_limit.refill_per_second,
    ));
    let breaker = Arc::new(CircuitBreaker::with_config(
        config.base_url.clone(),
        config.breaker_config(),
    ));

    JobClient::new(transport, pattern)
        .with_config(config.client_config())
        .with_retry_policy(config.retry_policy())
        .with_rate_limiter(limiter)
        .with_circuit_breaker(breaker)
}

/// Install signal handlers and return the shared token
fn cancellation_token(max_wait: Option<u64>) -> CancellationToken {
    let token = match max_wait {
        Some(seconds) => CancellationToken::with_timeout(Duration::from_secs(seconds)),
        None => CancellationToken::new(),
    };
    let handler = SignalHandler::new(token.clone());
    if let Err(e) = handler.install() {
        eprintln!("ingest-lane: cannot install signal handler: {}", e);
    }
    token
}

fn cmd_submit(
    config: &LaneConfig,
    pattern: &str,
    image: Option<PathBuf>,
    url: Option<String>,
    no_poll: bool,
    max_wait: Option<u64>,
) -> i32 {
    let payload = match build_payload(image.as_deref(), url.as_deref()) {
        Ok(payload) => payload,
        Err(message) => {
            eprintln!("ingest-lane: {}", message);
            return ErrorKind::InvalidRequest.exit_code();
        }
    };

    let client = build_client(config, pattern);
    let cancel = cancellation_token(max_wait);

    let key = match JobClient::idempotency_key(&payload) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("ingest-lane: {}", e);
            return e.exit_code();
        }
    };

    let handle = match client.submit(&payload, &key, &cancel) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("ingest-lane: submit failed: {}", e);
            return e.exit_code();
        }
    };
    eprintln!("submitted job {}", handle.job_id);

    if no_poll {
        println!("{}", handle.job_id);
        return 0;
    }

    match client.await_result(&handle, &cancel) {
        Ok(result) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&result.result).unwrap_or_default()
            );
            0
        }
        Err(e) => {
            eprintln!("ingest-lane: {}", e);
            e.exit_code()
        }
    }
}

fn cmd_status(config: &LaneConfig, job_id: &str) -> i32 {
    // Status reads are one-shot; pattern is irrelevant for this endpoint.
    let client = build_client(config, "unused");
    let cancel = cancellation_token(None);

    match client.job_status(job_id, &cancel) {
        Ok(data) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&data).unwrap_or_default()
            );
            0
        }
        Err(e) => {
            eprintln!("ingest-lane: {}", e);
            e.exit_code()
        }
    }
}

fn cmd_batch(
    config: &LaneConfig,
    pattern: &str,
    dir: &Path,
    include: Option<String>,
    concurrency: Option<usize>,
    two_phase: bool,
    report_path: &Path,
) -> i32 {
    let items = match collect_items(dir, include.as_deref()) {
        Ok(items) => items,
        Err(message) => {
            eprintln!("ingest-lane: {}", message);
            return ErrorKind::InvalidRequest.exit_code();
        }
    };
    if items.is_empty() {
        eprintln!("ingest-lane: no images found under {}", dir.display());
        return ErrorKind::InvalidRequest.exit_code();
    }
    eprintln!("processing {} image(s) with pattern {}", items.len(), pattern);

    let client = Arc::new(build_client(config, pattern));
    let cancel = cancellation_token(None);
    let batch_config = BatchConfig {
        max_concurrency: concurrency.unwrap_or(config.batch.max_concurrency),
        submit_concurrency: config.batch.submit_concurrency,
        poll_concurrency: config.batch.poll_concurrency,
    };
    let runner = BatchRunner::new(client, batch_config);

    let report = if two_phase {
        runner.run_two_phase(&items, &cancel)
    } else {
        runner.run(&items, &cancel)
    };

    eprintln!("{}", report.human_summary);
    let retryable = report.retryable_inputs();
    if !retryable.is_empty() {
        eprintln!("worth re-running ({}):", retryable.len());
        for input in &retryable {
            eprintln!("  {}", input);
        }
    }
    let permanent = report.permanent_failure_inputs();
    if !permanent.is_empty() {
        eprintln!("will not succeed as submitted ({}):", permanent.len());
        for input in &permanent {
            eprintln!("  {}", input);
        }
    }

    if let Err(e) = report.write_to_file(report_path) {
        eprintln!(
            "ingest-lane: cannot write report {}: {}",
            report_path.display(),
            e
        );
    } else {
        eprintln!("report written to {}", report_path.display());
    }

    if report.all_succeeded() {
        0
    } else if report
        .items
        .iter()
        .any(|i| i.error_kind == Some(ErrorKind::Cancelled))
    {
        ErrorKind::Cancelled.exit_code()
    } else {
        1
    }
}

/// Build a payload from either a local file or a URL
fn build_payload(image: Option<&Path>, url: Option<&str>) -> Result<Payload, String> {
    if let Some(url) = url {
        return Ok(Payload::url(url));
    }
    let path = image.ok_or("an image file or --url is required")?;
    let bytes =
        std::fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    Ok(Payload::inline(&bytes, media_type_for(path)))
}

/// Media type guessed from the file extension
fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Collect batch items from a directory, sorted for a stable report order
fn collect_items(dir: &Path, include: Option<&str>) -> Result<Vec<BatchItem>, String> {
    let matcher = match include {
        Some(glob) => Some(
            Glob::new(glob)
                .map_err(|e| format!("invalid --include glob: {}", e))?
                .compile_matcher(),
        ),
        None => None,
    };

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| format!("cannot scan {}: {}", dir.display(), e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if !is_supported_image(&path) {
            continue;
        }
        if let Some(matcher) = &matcher {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !matcher.is_match(name) {
                continue;
            }
        }
        paths.push(path);
    }
    paths.sort();

    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes =
            std::fs::read(&path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        items.push(BatchItem::new(
            path.display().to_string(),
            Payload::inline(&bytes, media_type_for(&path)),
        ));
    }
    Ok(items)
}

fn is_supported_image(path: &Path) -> bool {
    matches!(
        media_type_for(path),
        "image/jpeg" | "image/png" | "image/gif" | "image/webp" | "application/pdf"
    )
}
