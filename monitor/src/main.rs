//! banwatch Monitor - log-driven IP blocking.
//!
//! This binary tails the configured log files and adds the offending
//! addresses to nftables sets.
//!
//! # Commands
//!
//! - `banwatch-monitor run`: Start the monitor daemon
//! - `banwatch-monitor check`: Validate the configuration and the nftables sets
//! - `banwatch-monitor scan`: Print the addresses a source's file currently yields
//! - `banwatch-monitor block`: Add one address to a set
//! - `banwatch-monitor unblock`: Remove one address from a set
//!
//! # Environment Variables
//!
//! See the [`config`](banwatch_monitor::config) module for the file format.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use banwatch_monitor::commands::{self, ElementAction};
use banwatch_monitor::config::{Config, LogFormat, SetConfig};
use banwatch_monitor::matcher::PatternMatcher;
use banwatch_monitor::sink::{DryRunSink, NftablesSink, Sink};
use banwatch_monitor::stats::{self, StatsEntry};
use banwatch_monitor::tailer::Tailer;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// banwatch Monitor - log-driven IP blocking.
///
/// Tails log files and adds the IP addresses matched by the configured
/// patterns to nftables sets.
#[derive(Parser, Debug)]
#[command(name = "banwatch-monitor")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    BANWATCH_CONFIG    Configuration file used when --config is not given
    RUST_LOG           Log filter, overrides logging.level

EXAMPLES:
    # Validate the configuration and the nftables sets
    banwatch-monitor check --config /etc/banwatch.yaml

    # See what a source would block right now
    banwatch-monitor scan --source sshd --config /etc/banwatch.yaml

    # Start the monitor without touching the firewall
    banwatch-monitor run --config /etc/banwatch.yaml --dry-run

    # Lift a block by hand
    banwatch-monitor unblock --address 203.0.113.7 --set blacklist
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the monitor daemon.
    ///
    /// Watches every configured source until interrupted.
    Run {
        /// Configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Log the addresses instead of adding them to nftables.
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration, patterns, log files and nftables sets.
    Check {
        /// Configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Read a source's file once from the start and print the addresses found.
    ///
    /// Nothing is added to nftables.
    Scan {
        /// Name of the source to scan.
        #[arg(short, long)]
        source: String,

        /// Configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Add one address to an nftables set.
    Block(ElementArgs),

    /// Remove one address from an nftables set.
    Unblock(ElementArgs),
}

/// Arguments of `block` and `unblock`.
#[derive(Args, Debug)]
struct ElementArgs {
    /// Address to add or remove.
    #[arg(short, long)]
    address: IpAddr,

    /// Set name; may be omitted when the configuration uses a single set.
    #[arg(long)]
    set: Option<String>,

    /// Configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, dry_run } => {
            let config = load_config(config)?;
            init_logging(&config);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_monitor(config, dry_run))
        }
        Command::Check { config } => {
            let config = load_config(config)?;
            init_logging(&config);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_check(config))
        }
        Command::Scan { source, config } => {
            let config = load_config(config)?;
            init_logging(&config);
            run_scan(&config, &source)
        }
        Command::Block(args) => run_element(args, ElementAction::Block),
        Command::Unblock(args) => run_element(args, ElementAction::Unblock),
    }
}

/// Resolves and loads the configuration file.
fn load_config(cli_path: Option<PathBuf>) -> Result<Config> {
    let path = Config::resolve_path(cli_path)?;
    Config::load(&path).with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Runs the monitor until a shutdown signal or until every source has ended.
async fn run_monitor(config: Config, dry_run: bool) -> Result<()> {
    info!(sources = config.sources.len(), dry_run, "Starting banwatch Monitor");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // One sink per distinct set; `None` records a set that failed its check.
    let mut sinks: HashMap<SetConfig, Option<Arc<dyn Sink>>> = HashMap::new();
    let mut entries = Vec::new();
    let mut handles = Vec::new();

    for source in &config.sources {
        let Some(set) = config.set_for(source) else {
            error!(source = %source.name, "No nftables set for source, skipping");
            continue;
        };

        if !sinks.contains_key(set) {
            let sink = build_sink(set, dry_run).await;
            sinks.insert(set.clone(), sink);
        }
        let Some(sink) = sinks.get(set).cloned().flatten() else {
            warn!(source = %source.name, set = %set.target(), "Set unavailable, skipping source");
            continue;
        };

        let mut tailer = match Tailer::new(source, set, config.rotation.clone(), sink) {
            Ok(tailer) => tailer,
            Err(e) => {
                error!(source = %source.name, error = %e, "Failed to set up source, skipping");
                continue;
            }
        };
        if let Err(e) = tailer.open() {
            error!(source = %source.name, error = %e, "Failed to open log file, skipping source");
            continue;
        }

        entries.push(StatsEntry {
            source: source.name.clone(),
            set: set.target(),
            stats: tailer.stats(),
        });
        handles.push(tokio::spawn(tailer.run(shutdown_rx.clone())));
    }

    if handles.is_empty() {
        bail!("No source could be started");
    }
    info!(started = handles.len(), configured = config.sources.len(), "Sources started");

    let reporter = config.stats.interval().map(|interval| {
        tokio::spawn(stats::report_periodically(
            entries.clone(),
            interval,
            shutdown_rx.clone(),
        ))
    });

    let outcome = commands::supervise(
        handles,
        wait_for_shutdown(),
        &shutdown_tx,
        Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
    )
    .await;

    match reporter {
        Some(reporter) => {
            if let Err(e) = reporter.await {
                error!(error = %e, "Statistics reporter panicked");
                stats::log_all(&entries);
            }
        }
        None => stats::log_all(&entries),
    }

    info!(
        stopped = outcome.stopped,
        failed = outcome.failed,
        unfinished = outcome.unfinished,
        "banwatch Monitor stopped"
    );
    Ok(())
}

/// Creates the sink for a set; in normal mode the set must exist.
async fn build_sink(set: &SetConfig, dry_run: bool) -> Option<Arc<dyn Sink>> {
    if dry_run {
        return Some(Arc::new(DryRunSink::new(set.target())));
    }

    let sink = NftablesSink::new(set.clone());
    match sink.check().await {
        Ok(()) => {
            debug!(set = %set.target(), table = %set.table, family = %set.family, "nftables set found");
            Some(Arc::new(sink))
        }
        Err(e) => {
            error!(
                set = %set.target(),
                table = %set.table,
                family = %set.family,
                error = %e,
                "nftables set is not usable"
            );
            None
        }
    }
}

/// Checks everything `run` would need and reports each problem.
async fn run_check(config: Config) -> Result<()> {
    let mut problems = 0usize;

    for source in &config.sources {
        let Some(set) = config.set_for(source) else {
            continue;
        };

        let matcher = PatternMatcher::compile(
            &source.name,
            &source.patterns,
            set.address_family,
            source.parse_whitelist()?,
        );
        println!(
            "source {}: {} of {} pattern(s) valid, set {}",
            source.name,
            matcher.pattern_count(),
            source.patterns.len(),
            set.target()
        );
        for invalid in matcher.invalid_patterns() {
            println!("  invalid pattern {:?}: {}", invalid.pattern, invalid.error);
            problems += 1;
        }

        if let Err(e) = std::fs::File::open(&source.logfile) {
            println!("  cannot open {}: {}", source.logfile.display(), e);
            problems += 1;
        }
    }

    for set in config.sets() {
        match NftablesSink::new(set.clone()).check().await {
            Ok(()) => println!("set {} in table {} {}: ok", set.name, set.family, set.table),
            Err(e) => {
                println!("set {} in table {} {}: {}", set.name, set.family, set.table, e);
                problems += 1;
            }
        }
    }

    if problems > 0 {
        bail!("{problems} problem(s) found");
    }
    println!("Configuration OK");
    Ok(())
}

/// Reads one source's file from the start and prints the addresses found.
fn run_scan(config: &Config, name: &str) -> Result<()> {
    let report = commands::scan(config, name)?;

    for address in &report.addresses {
        println!("{address}");
    }
    eprintln!(
        "{}: {} line(s), {} byte(s), {} address(es) for {}",
        report.logfile.display(),
        report.lines,
        report.bytes,
        report.addresses.len(),
        report.set
    );
    Ok(())
}

/// Adds or removes one address by hand.
fn run_element(args: ElementArgs, action: ElementAction) -> Result<()> {
    let config = load_config(args.config)?;
    init_logging(&config);

    let set = commands::resolve_set(&config, args.set.as_deref())?;
    let sink = NftablesSink::new(set.clone());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let changed = runtime.block_on(commands::apply(&sink, action, args.address))?;
    if !changed {
        bail!(
            "{} cannot hold {} (set type {})",
            set.target(),
            args.address,
            set.address_family
        );
    }

    let verb = match action {
        ElementAction::Block => "added to",
        ElementAction::Unblock => "removed from",
    };
    println!("{} {} {}", args.address, verb, set.target());
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the most verbose of the global and
/// per-source levels is enabled; each source gates its own verbose output.
fn init_logging(config: &Config) {
    let level = config
        .sources
        .iter()
        .filter_map(|source| source.log_level)
        .map(|severity| severity.level_filter())
        .fold(config.logging.level.level_filter(), LevelFilter::max);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true);

    match config.logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
