use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

use chain_log_reconciler::metrics::Metrics;
use chain_log_reconciler::models::common::{Config, Side};
use chain_log_reconciler::reconciler::sources::connect;
use chain_log_reconciler::reconciler::{Deadline, ReconcileParams, Reconciler, RunContext};
use chain_log_reconciler::utils::retry::RetryConfig;
use chain_log_reconciler::utils::{ConfigOverrides, load_config};

#[derive(Parser)]
#[command(name = "chain-log-reconciler", version, about = "Compare event logs between two EVM endpoints")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    loglevel: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch logs from two chains and compare if the results are the same
    Comparelogs(CompareLogsArgs),
    /// Print version and build details
    Version,
}

#[derive(Args)]
struct CompareLogsArgs {
    /// YAML config file; command-line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,
    /// RPC endpoint for chain 1
    #[arg(long = "chain-1")]
    chain_1: Option<String>,
    /// RPC endpoint for chain 2
    #[arg(long = "chain-2")]
    chain_2: Option<String>,
    /// Start block (inclusive)
    #[arg(long)]
    from_block: Option<u64>,
    /// End block (inclusive). 0 means latest on each chain
    #[arg(long)]
    to_block: Option<u64>,
    /// Contract address to filter
    #[arg(long)]
    address: Option<String>,
    /// Topics for one position as a comma-separated OR-set. Repeat once per position
    #[arg(long, action = ArgAction::Append)]
    topics: Vec<String>,
    /// Ignore log ordering differences
    #[arg(long, action = ArgAction::Set)]
    ignore_order: Option<bool>,
    /// Overall timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Maximum number of blocks per eth_getLogs call
    #[arg(long)]
    max_window_size: Option<u64>,
    /// Write a JSON report of every window to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl CompareLogsArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            chain_1: self.chain_1.clone(),
            chain_2: self.chain_2.clone(),
            from_block: self.from_block,
            to_block: self.to_block,
            address: self.address.clone(),
            topics: (!self.topics.is_empty()).then(|| self.topics.clone()),
            ignore_order: self.ignore_order,
            timeout_secs: self.timeout,
            max_window_size: self.max_window_size,
            report_path: self.report.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.loglevel)),
        )
        .init();

    match cli.command {
        Command::Version => {
            println!("{}", detail_version());
            Ok(())
        }
        Command::Comparelogs(args) => compare_logs(args).await,
    }
}

async fn compare_logs(args: CompareLogsArgs) -> Result<()> {
    println!();
    info!("=========================== INITIALIZING ===========================");

    // Load config
    let config: Config = load_config(args.config.as_deref(), args.overrides())?;
    info!("Config loaded successfully");

    let params = ReconcileParams::from_config(&config)?;

    // Initialize optional metrics
    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new()?);
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await?;
        Some(metrics)
    } else {
        info!("Metrics are disabled");
        None
    };

    // The timeout covers dialing as well as comparing
    let deadline = Deadline::after(params.timeout);

    // Dial both endpoints concurrently
    let retry_config = RetryConfig::with_max_attempts(config.connect_retries);
    let ((first, chain_id_first), (second, chain_id_second)) = deadline
        .bound(async {
            tokio::try_join!(
                connect(Side::First, &config.chain_1, metrics.clone(), &retry_config),
                connect(Side::Second, &config.chain_2, metrics.clone(), &retry_config),
            )
        })
        .await
        .context("failed to connect to the chains")?;
    if chain_id_first != chain_id_second {
        warn!(
            "Chain IDs differ: chain1={} chain2={}",
            chain_id_first, chain_id_second
        );
    }

    println!();
    info!("========================= COMPARING LOGS ==========================");

    let reconciler = Reconciler::new(first, second, params, metrics);
    let mut ctx = RunContext::new();
    info!("Time left for comparison: {:?}", deadline.remaining());
    let report = reconciler
        .run_before(&deadline, &mut ctx)
        .await
        .with_context(|| format!("run aborted after {} windows", ctx.summary().total_windows))?;

    if let Some(path) = &config.report_path {
        report.write_json(path)?;
        info!("Run report written to {}", path.display());
    }

    if !report.is_success() {
        bail!(
            "found {} mismatching ranges",
            report.summary.mismatched_windows
        );
    }
    Ok(())
}

fn detail_version() -> String {
    format!(
        "AppName:\t{}\nVersion:\t{}\nGitBranch:\t{}\nGitCommit:\t{}\nBuildTime:\t{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_BRANCH").unwrap_or("unknown"),
        option_env!("GIT_COMMIT").unwrap_or("unknown"),
        option_env!("BUILD_TIME").unwrap_or("unknown"),
    )
}
