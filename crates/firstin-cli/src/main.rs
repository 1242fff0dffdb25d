mod config;
mod tui;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use firstin_client::{
    build_client, send_test_notification, Adapter, AnyAnalyzer, AnyNotifier, LlmAnalyzer,
    LogNotifier, SlackNotifier,
};
use firstin_core::traits::NopAnalyzer;
use firstin_core::{
    CompanyPoller, JobFilter, RetryConfig, RetryFetcher, Scheduler, SeenStore,
    TitleAndLocationFilter,
};
use firstin_db::{NopStore, SqliteSeenStore};

use config::{CompanyConfig, Config, NotificationConfig};

const STORE_PATH: &str = "jobs.db";
/// Seen entries older than this are far outside any freshness window;
/// pruning them keeps the store file small.
const PRUNE_HORIZON: Duration = Duration::from_secs(90 * 24 * 3600);

type Poller<S> = CompanyPoller<
    RetryFetcher<Adapter>,
    TitleAndLocationFilter,
    S,
    AnyNotifier,
    AnyAnalyzer,
>;

#[derive(Parser)]
#[command(name = "firstin", about = "Job radar — be first in the door")]
#[command(long_about = "FirstIn polls company career pages and alerts you to new engineering roles.")]
struct Cli {
    /// Path to config file (default: FIRSTIN_CONFIG env var or ./config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the polling daemon; blocks until SIGINT/SIGTERM
    Start,

    /// Poll one company per ATS against a throwaway store, then exit
    Check,

    /// Browse jobs interactively (TUI)
    Audit,

    /// Notification subcommands
    Notify {
        #[command(subcommand)]
        action: NotifyCommands,
    },

    /// List all configured companies
    Companies,

    /// Print version info
    Version,
}

#[derive(Subcommand)]
enum NotifyCommands {
    /// Send a test notification through the configured notifier
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    setup_tracing(cli.debug);

    // No subcommand runs the daemon, so systemd units can invoke the
    // binary directly.
    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => cmd_start(cli.config).await,
        Commands::Check => cmd_check(cli.config).await,
        Commands::Audit => cmd_audit(cli.config).await,
        Commands::Notify {
            action: NotifyCommands::Test,
        } => cmd_notify_test(cli.config).await,
        Commands::Companies => cmd_companies(cli.config),
        Commands::Version => {
            println!("firstin {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn setup_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolve the config path: flag, then FIRSTIN_CONFIG, then ./config.yaml.
fn load_config(flag: Option<PathBuf>) -> Result<Config> {
    let path = flag
        .or_else(|| std::env::var_os("FIRSTIN_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    Config::load(&path).with_context(|| format!("failed to load config {}", path.display()))
}

fn setup_notifier(cfg: &Config, client: reqwest::Client) -> AnyNotifier {
    match &cfg.notification {
        NotificationConfig::Slack { webhook_url } => {
            tracing::info!("using slack notifier");
            AnyNotifier::Slack(SlackNotifier::new(webhook_url, client))
        }
        NotificationConfig::Log => AnyNotifier::Log(LogNotifier::new()),
    }
}

fn setup_analyzer(cfg: &Config, client: reqwest::Client) -> AnyAnalyzer {
    if cfg.ai.enabled {
        tracing::info!(model = %cfg.ai.model, "job analysis enabled");
        AnyAnalyzer::Llm(LlmAnalyzer::with_base_url(
            &cfg.ai.api_key,
            &cfg.ai.model,
            &cfg.ai.base_url,
            client,
        ))
    } else {
        AnyAnalyzer::Nop(NopAnalyzer)
    }
}

fn job_filter(cfg: &Config) -> TitleAndLocationFilter {
    TitleAndLocationFilter::new(
        cfg.filters.title_keywords.clone(),
        cfg.filters.title_exclude_keywords.clone(),
        cfg.filters.locations.clone(),
        cfg.filters.exclude_locations.clone(),
    )
}

fn create_adapter(
    company: &CompanyConfig,
    client: reqwest::Client,
    pre_filter: Option<Arc<dyn JobFilter>>,
) -> Option<Adapter> {
    let adapter = Adapter::for_ats(
        &company.ats,
        company.board_ref(),
        &company.name,
        client,
        pre_filter,
    );
    if adapter.is_none() {
        tracing::warn!(company = %company.name, ats = %company.ats, "unsupported ATS, skipping");
    }
    adapter
}

fn build_pollers<S: SeenStore>(
    cfg: &Config,
    store: S,
    notifier: AnyNotifier,
    analyzer: AnyAnalyzer,
    client: reqwest::Client,
) -> Vec<Poller<S>> {
    let filter = job_filter(cfg);
    let pre_filter: Arc<dyn JobFilter> = Arc::new(filter.clone());

    let mut pollers = Vec::new();
    for company in cfg.companies.iter().filter(|c| c.enabled) {
        let Some(adapter) =
            create_adapter(company, client.clone(), Some(pre_filter.clone()))
        else {
            continue;
        };

        let fetcher = RetryFetcher::new(adapter, RetryConfig::default());
        pollers.push(CompanyPoller::new(
            &company.name,
            &company.ats,
            fetcher,
            filter.clone(),
            store.clone(),
            notifier.clone(),
            analyzer.clone(),
            cfg.filters.max_age,
        ));
        tracing::info!(name = %company.name, ats = %company.ats, "registered company");
    }
    pollers
}

/// Cancel the token on SIGINT or, on unix, SIGTERM.
fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        cancel.cancel();
    });
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn cmd_start(config_flag: Option<PathBuf>) -> Result<()> {
    let cfg = load_config(config_flag)?;
    tracing::info!(
        interval_secs = cfg.polling_interval.as_secs(),
        companies = cfg.companies.len(),
        title_keywords = cfg.filters.title_keywords.len(),
        locations = cfg.filters.locations.len(),
        max_age_secs = cfg.filters.max_age.as_secs(),
        "config loaded"
    );

    let store = SqliteSeenStore::open(STORE_PATH)
        .await
        .context("failed to open store")?;
    match store.prune(PRUNE_HORIZON).await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "pruned old seen entries"),
        Err(err) => tracing::warn!(error = %err, "seen-set prune failed"),
    }

    let client = build_client().context("failed to create HTTP client")?;
    let notifier = setup_notifier(&cfg, client.clone());
    let analyzer = setup_analyzer(&cfg, client.clone());

    let pollers = build_pollers(&cfg, store.clone(), notifier, analyzer, client);
    if pollers.is_empty() {
        anyhow::bail!("no companies to poll");
    }

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    let scheduler = Scheduler::new(
        pollers,
        cfg.polling_interval,
        cfg.rate_limit.min_delay,
        cfg.rate_limit.ats_overrides.clone(),
    );
    scheduler.run(cancel).await;

    store.close().await;
    tracing::info!("goodbye");
    Ok(())
}

async fn cmd_check(config_flag: Option<PathBuf>) -> Result<()> {
    let cfg = load_config(config_flag)?;
    tracing::info!("check mode: no jobs will be marked as seen");

    let client = build_client().context("failed to create HTTP client")?;
    let notifier = setup_notifier(&cfg, client.clone());
    let analyzer = setup_analyzer(&cfg, client.clone());

    let pollers = build_pollers(&cfg, NopStore::new(), notifier, analyzer, client);
    if pollers.is_empty() {
        anyhow::bail!("no companies to poll");
    }

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    // One company per ATS family is enough to prove each integration.
    let mut tested: Vec<String> = Vec::new();
    let mut failures = 0;
    for poller in &pollers {
        if tested.iter().any(|ats| ats == poller.ats()) {
            tracing::info!(company = %poller.name(), ats = %poller.ats(), "skipping (ATS already tested)");
            continue;
        }
        tested.push(poller.ats().to_string());
        if let Err(err) = poller.poll(cancel.clone()).await {
            tracing::error!(company = %poller.name(), error = %err, "poll failed");
            failures += 1;
        }
    }

    tracing::info!("check complete");
    if failures > 0 {
        anyhow::bail!("{failures} of {} ATS checks failed", tested.len());
    }
    Ok(())
}

async fn cmd_audit(config_flag: Option<PathBuf>) -> Result<()> {
    let cfg = load_config(config_flag)?;
    let client = build_client().context("failed to create HTTP client")?;
    let analyzer = setup_analyzer(&cfg, client.clone());
    tui::run_audit(&cfg, client, analyzer).await
}

async fn cmd_notify_test(config_flag: Option<PathBuf>) -> Result<()> {
    let cfg = load_config(config_flag)?;
    let client = build_client().context("failed to create HTTP client")?;
    let notifier = setup_notifier(&cfg, client);

    send_test_notification(&notifier)
        .await
        .context("test notification failed")?;
    tracing::info!("test notification sent successfully");
    Ok(())
}

fn cmd_companies(config_flag: Option<PathBuf>) -> Result<()> {
    let cfg = load_config(config_flag)?;

    println!("{:<25} {:<15} {}", "Company", "ATS", "Status");
    println!("{}", "─".repeat(47));

    let (mut enabled, mut disabled) = (0, 0);
    for company in &cfg.companies {
        let status = if company.enabled {
            enabled += 1;
            "enabled"
        } else {
            disabled += 1;
            "disabled"
        };
        println!("{:<25} {:<15} {}", company.name, company.ats, status);
    }

    println!(
        "\nTotal: {} companies ({enabled} enabled, {disabled} disabled)",
        cfg.companies.len()
    );
    Ok(())
}
