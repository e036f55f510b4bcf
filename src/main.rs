//! Utsushi main entry point
//!
//! This is the command-line interface for the Utsushi website cloner.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use utsushi::agent::{ActivityTracker, PageCaptureAgent, SettleDetector};
use utsushi::archive::Assembler;
use utsushi::capture::{CaptureStore, SESSION_STATE_KEY};
use utsushi::config::{load_config_with_hash, Config};
use utsushi::crawler::crawl;
use utsushi::host::{build_http_client, BrowserHost, HttpHost};
use utsushi::UtsushiError;

/// Utsushi: a website-to-archive cloner
///
/// Utsushi crawls a website through a browser-host boundary, snapshots
/// each page's DOM and storage, records the network responses behind it,
/// and assembles everything into a self-contained offline ZIP.
#[derive(Parser, Debug)]
#[command(name = "utsushi")]
#[command(version = "1.0.0")]
#[command(about = "Clone a live website into an offline archive", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Discard any persisted session before starting
    #[arg(long, conflicts_with = "export_only")]
    fresh: bool,

    /// Capture only the seed page, without crawling its links
    #[arg(long, conflicts_with_all = ["export_only", "dry_run"])]
    snapshot: bool,

    /// Skip crawling and assemble an archive from the persisted session
    #[arg(long, conflicts_with_all = ["snapshot", "dry_run"])]
    export_only: bool,

    /// Validate config and show what would be cloned without fetching anything
    #[arg(long, conflicts_with_all = ["snapshot", "export_only"])]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        return handle_dry_run(&config);
    }

    let host = Arc::new(build_host(&config)?);
    let store = init_store(&config, host.as_ref(), cli.fresh).await?;

    // Handle different modes
    if cli.snapshot {
        handle_snapshot(config, host, store).await?;
    } else if cli.export_only {
        handle_export(config, host, store).await?;
    } else {
        handle_crawl(config, host, store).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("utsushi=info,warn"),
            1 => EnvFilter::new("utsushi=debug,info"),
            2 => EnvFilter::new("utsushi=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds the HTTP-backed browser host from the config
fn build_host(config: &Config) -> anyhow::Result<HttpHost> {
    let client = build_http_client(
        &config.capture.user_agent,
        Duration::from_secs(config.host.request_timeout_secs),
    )
    .context("failed to build HTTP client")?;

    Ok(HttpHost::new(
        client,
        &config.host.state_dir,
        &config.host.download_dir,
    ))
}

/// Creates the capture store, restoring the persisted session unless a
/// fresh start was requested
async fn init_store(
    config: &Config,
    host: &HttpHost,
    fresh: bool,
) -> anyhow::Result<Arc<Mutex<CaptureStore>>> {
    let seed = config.seed().context("invalid seed-url in configuration")?;
    let mut store = CaptureStore::new(&seed, config.capture.same_origin_only);

    if fresh {
        tracing::info!("Starting fresh (discarding any persisted session)");
        if let Err(e) = host.clear_state(SESSION_STATE_KEY).await {
            tracing::warn!("Failed to clear persisted session: {}", e);
        }
    } else {
        match host.load_state(SESSION_STATE_KEY).await {
            Ok(Some(payload)) => {
                store.restore_from(payload);
            }
            Ok(None) => tracing::debug!("No persisted session found"),
            Err(e) => tracing::warn!("Failed to load persisted session: {}", e),
        }
    }

    Ok(Arc::new(Mutex::new(store)))
}

/// Handles the default mode: crawl from the seed, then archive
async fn handle_crawl(
    config: Config,
    host: Arc<HttpHost>,
    store: Arc<Mutex<CaptureStore>>,
) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let cancel = Arc::new(AtomicBool::new(false));

    // Ctrl-C stops dequeuing; in-flight captures drain and the partial
    // session still gets archived below
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; letting in-flight captures finish");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let outcome = match crawl(config.clone(), host.clone(), store.clone(), cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let UtsushiError::Host(ref host_err) = e {
                if host_err.is_fatal() {
                    eprintln!("The browser control channel was lost; the crawl was aborted.");
                    eprintln!("The partial session was kept. Re-run with --export-only to archive it.");
                }
            }
            return Err(e.into());
        }
    };

    println!("\n=== Crawl Summary ===");
    println!("Pages captured:  {}", outcome.pages_captured);
    println!("Pages failed:    {}", outcome.pages_failed);
    println!("Assets recorded: {}", outcome.assets_captured);
    println!("Bytes captured:  {}", outcome.bytes_captured);
    println!("Retries:         {}", outcome.retries);
    if outcome.cancelled {
        println!("Status:          interrupted (archiving the partial session)");
    }
    println!("Elapsed:         {:.1}s", outcome.elapsed.as_secs_f64());

    write_archive(&config, host.as_ref(), &store).await
}

/// Handles --snapshot: captures the seed page in place, without crawling
async fn handle_snapshot(
    config: Config,
    host: Arc<HttpHost>,
    store: Arc<Mutex<CaptureStore>>,
) -> anyhow::Result<()> {
    let seed = config.seed().context("invalid seed-url in configuration")?;
    tracing::info!("Capturing single page: {}", seed);

    let agent = PageCaptureAgent::new(
        host.clone(),
        SettleDetector::new(Arc::new(ActivityTracker::new()), config.settle_policy()),
        config.capture_policy(),
    );
    let page = agent
        .capture_foreground(&seed)
        .await
        .context("page capture failed")?;

    let cookies = match host.get_cookies(&seed).await {
        Ok(cookies) => cookies,
        Err(e) => {
            tracing::debug!("Cookie read failed: {}", e);
            Vec::new()
        }
    };
    match host.drain_network_events().await {
        Ok(entries) => {
            let mut store = store.lock().unwrap();
            for entry in entries {
                store.record_request(entry);
            }
        }
        Err(e) => tracing::warn!("Network drain failed: {}", e),
    }

    let title = page.title.clone();
    let payload = {
        let mut store = store.lock().unwrap();
        store.record_page(page, cookies);
        store.session_payload()
    };
    host.persist_state(SESSION_STATE_KEY, &payload)
        .await
        .context("failed to persist session")?;

    println!("✓ Captured \"{}\" ({})", title, seed);
    println!("✓ Session persisted; use --export-only to build the archive");
    Ok(())
}

/// Handles --export-only: archives the persisted session without crawling
async fn handle_export(
    config: Config,
    host: Arc<HttpHost>,
    store: Arc<Mutex<CaptureStore>>,
) -> anyhow::Result<()> {
    {
        let store = store.lock().unwrap();
        if store.is_empty() {
            anyhow::bail!("no persisted session to export; run a crawl first");
        }
        tracing::info!(
            "Exporting persisted session: {} pages, {} requests",
            store.pages().len(),
            store.requests().len()
        );
    }

    write_archive(&config, host.as_ref(), &store).await
}

/// Handles the --dry-run mode: validates config and shows what would be cloned
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let seed = config.seed().context("invalid seed-url in configuration")?;

    println!("=== Utsushi Dry Run ===\n");

    println!("Capture:");
    println!("  Seed URL: {}", seed);
    println!("  Same-origin only: {}", config.capture.same_origin_only);
    println!("  Stealth: {}", config.capture.stealth);
    println!("  User agent: {}", config.capture.user_agent);

    println!("\nCrawler:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Workers: {}", config.crawler.workers);
    println!("  Task delay: {}ms", config.crawler.task_delay_ms);

    println!("\nSettle detection:");
    println!("  Grace period: {}ms", config.settle.grace_ms);
    println!("  Idle window: {}ms", config.settle.idle_ms);
    println!("  Poll interval: {}ms", config.settle.poll_ms);
    println!("  Max wait: {}ms", config.settle.max_wait_ms);

    println!("\nArchive:");
    println!("  Output: {}", config.archive.output_path);
    println!("  Strip analytics: {}", config.archive.strip_analytics);

    println!("\nHost:");
    println!("  State dir: {}", config.host.state_dir);
    println!("  Download dir: {}", config.host.download_dir);
    println!("  Request timeout: {}s", config.host.request_timeout_secs);

    println!("\n✓ Configuration is valid");
    println!("✓ Would clone {} to {}", seed, config.archive.output_path);

    Ok(())
}

/// Assembles the offline archive and hands it to the host download surface
async fn write_archive(
    config: &Config,
    host: &HttpHost,
    store: &Arc<Mutex<CaptureStore>>,
) -> anyhow::Result<()> {
    let seed = config.seed().context("invalid seed-url in configuration")?;
    let assembler = Assembler::new(seed, config.archive.strip_analytics);

    let bundle = {
        let store = store.lock().unwrap();
        let mut last_bucket = 0u8;
        assembler
            .assemble_with_progress(&store, |pct| {
                if pct / 10 > last_bucket {
                    last_bucket = pct / 10;
                    tracing::info!("Assembling archive: {}%", pct);
                }
            })
            .context("archive assembly failed")?
    };

    host.download_file(&bundle.bytes, &config.archive.output_path)
        .await
        .context("failed to write the archive")?;

    println!("\n=== Archive ===");
    println!("Output:          {}", config.archive.output_path);
    println!("Pages:           {}", bundle.summary.pages);
    println!("Assets:          {}", bundle.summary.assets);
    println!("API mocks:       {}", bundle.summary.api_mocks);
    if bundle.summary.streamed_messages > 0 {
        println!("SSE messages:    {}", bundle.summary.streamed_messages);
    }
    println!("Size:            {} bytes", bundle.summary.bytes);

    let message = format!(
        "Saved {} pages and {} assets to {}",
        bundle.summary.pages, bundle.summary.assets, config.archive.output_path
    );
    if let Err(e) = host.notify_user("Clone complete", &message).await {
        tracing::debug!("Notification failed: {}", e);
    }

    Ok(())
}
