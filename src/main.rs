// Recipe Gate - Main Entry Point
//
// Command-line front end for the compliance-gated recipe fetcher:
// - Inspect limits and usage
// - Validate recipe URLs
// - Fetch pages through admission control
//
// Usage is kept in a JSON file between invocations, so limits hold across
// separate runs of the command.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recipe_gate::compliance::{ComplianceMonitor, RejectReason};
use recipe_gate::config::Config;
use recipe_gate::extraction::{
    validate_recipe_url, ComplianceGatedExecutor, ErrorKind, ExtractionResult, FetchedPage,
    PageFetcher,
};
use recipe_gate::{logging, metrics, UsageStore};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Recipe Gate: compliance-gated recipe page fetcher
#[derive(Parser, Debug)]
#[command(name = "recipe-gate")]
#[command(version)]
#[command(about = "Fetch recipe pages without exceeding usage limits", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the usage file (overrides state.usage_file)
    #[arg(long, global = true)]
    usage_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the current compliance status
    Status,
    /// Show usage against the daily limit
    Usage,
    /// Check whether a URL is a supported recipe page
    ValidateUrl {
        /// Recipe page URL
        url: String,
    },
    /// Fetch a recipe page through admission control
    Fetch {
        /// Recipe page URL
        url: String,

        /// Session to account the fetch to
        #[arg(long)]
        session: Option<String>,

        /// Time budget per attempt in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Number of gated runs to perform
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Wait out rate limiting instead of reporting it
        #[arg(long)]
        wait: bool,

        /// Print Prometheus metrics to stderr when done
        #[arg(long)]
        metrics: bool,
    },
    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    if let Some(path) = args.usage_file {
        config.state.usage_file = Some(path);
    }
    logging::init(&config.logging, args.verbose)?;
    metrics::init().context("Failed to register metrics")?;
    debug!("Configuration: {:?}", config);

    match args.command {
        Commands::Status => {
            let gate = Gate::open(&config).await?;
            print_json(&gate.executor.status()?)?;
        }
        Commands::Usage => {
            let gate = Gate::open(&config).await?;
            let executor = &gate.executor;
            let usage = executor.daily_usage()?;
            print_json(&json!({
                "date": executor.monitor().now().date_naive().to_string(),
                "usage_count": usage.count,
                "daily_limit": usage.limit,
                "remaining": usage.remaining,
                "window_start": usage.window_start,
                "session_id": executor.default_session_id(),
            }))?;
        }
        Commands::ValidateUrl { url } => {
            let validation = validate_recipe_url(&url, &config.fetch);
            print_json(&validation)?;
            if !validation.valid {
                anyhow::bail!("{} is not a supported recipe page", url);
            }
        }
        Commands::Fetch {
            url,
            session,
            timeout_secs,
            repeat,
            wait,
            metrics: show_metrics,
        } => {
            let validation = validate_recipe_url(&url, &config.fetch);
            if !validation.valid {
                print_json(&validation)?;
                anyhow::bail!("{} is not a supported recipe page", url);
            }

            let timeout =
                Duration::from_secs(timeout_secs.unwrap_or(config.fetch.attempt_timeout_secs));
            let succeeded = fetch(&config, &url, session.as_deref(), timeout, repeat, wait).await?;

            if show_metrics {
                eprintln!("{}", metrics::gather_metrics()?);
            }
            if succeeded < repeat {
                anyhow::bail!("{} of {} fetches did not succeed", repeat - succeeded, repeat);
            }
        }
        Commands::CheckConfig => {
            info!("Configuration is valid");
            print_json(&config)?;
        }
    }

    Ok(())
}

/// Executor plus the file its usage history lives in
struct Gate {
    executor: ComplianceGatedExecutor,
    store: Option<UsageStore>,
}

impl Gate {
    /// Build the executor, restoring stored usage when persistence is on
    async fn open(config: &Config) -> Result<Self> {
        let monitor = ComplianceMonitor::new(config.compliance.clone());
        let store = if config.state.persist {
            let store = UsageStore::new(config.state.usage_path());
            let restored = monitor.restore(store.load().await?)?;
            debug!("Restored {} usage events from {:?}", restored, store.path());
            Some(store)
        } else {
            None
        };

        Ok(Self {
            executor: ComplianceGatedExecutor::new(monitor, config.retry.clone()),
            store,
        })
    }

    /// Write the retained usage history back to disk
    async fn save(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let events = self.executor.monitor().recorded_events()?;
        store.save(&events).await
    }
}

/// Run `repeat` gated fetches and print one JSON report per run
///
/// Returns how many succeeded.
async fn fetch(
    config: &Config,
    url: &str,
    session: Option<&str>,
    timeout: Duration,
    repeat: u32,
    wait: bool,
) -> Result<u32> {
    let gate = Gate::open(config).await?;
    let executor = &gate.executor;
    let fetcher = PageFetcher::new(&config.fetch).context("Failed to build page fetcher")?;
    let mut succeeded = 0;

    for run in 1..=repeat {
        info!("Fetch {}/{}: {}", run, repeat, url);
        let mut result: ExtractionResult<FetchedPage> = executor
            .run(&fetcher, url.to_string(), session, timeout)
            .await;
        gate.save().await?;

        while wait {
            let Some(ErrorKind::ComplianceRejected {
                reason: RejectReason::RateLimited,
                next_eligible_at,
            }) = result.error_kind()
            else {
                break;
            };
            let pause = (next_eligible_at - executor.monitor().now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            info!("Rate limited, waiting {:?}", pause);
            tokio::time::sleep(pause).await;
            result = executor.run(&fetcher, url.to_string(), session, timeout).await;
            gate.save().await?;
        }

        if result.is_success() {
            succeeded += 1;
        }
        print_json(&result.map_payload(|page| page.summary()))?;
    }

    Ok(succeeded)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON")?;
    println!("{}", rendered);
    Ok(())
}
