use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::providers::ProviderBuilder;
use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use tokio::time::interval;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod display;
mod error;
mod evaluator;
mod multicall;
mod pools;
mod ranker;
mod routes;
mod scanner;
mod tick_math;
mod tokens;

use config::{load_registry, DEFAULT_INTERVAL_MS, DEFAULT_TOP_K};
use display::{display_outcome, display_outcome_json, init_arb_log};
use multicall::Multicall3Client;
use scanner::Scanner;

#[derive(Parser)]
#[command(name = "base-tri-arb")]
#[command(about = "Triangular arbitrage scanner for Base Mainnet", long_about = None)]
struct Cli {
    /// Pool registry file
    #[arg(long, global = true, default_value = "pools.json")]
    pools: PathBuf,

    /// How many ranked routes to report
    #[arg(long, global = true, default_value_t = DEFAULT_TOP_K)]
    top: usize,

    /// Emit results as JSON instead of the terminal report
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one detection cycle and exit (default)
    Scan,

    /// Run detection cycles forever at a fixed interval
    Watch {
        /// Milliseconds between cycle starts
        #[arg(long, default_value_t = DEFAULT_INTERVAL_MS)]
        interval_ms: u64,
    },
}

async fn build_scanner(cli: &Cli) -> Result<Scanner> {
    let rpc_url = std::env::var("BASE_RPC")
        .wrap_err("BASE_RPC must be set (environment or .env file)")?;
    let url: reqwest::Url = rpc_url.parse().wrap_err("BASE_RPC is not a valid URL")?;
    let provider = ProviderBuilder::new().connect_http(url);
    let client = Arc::new(Multicall3Client::new(provider));

    let pools = load_registry(&cli.pools)?;
    if pools.is_empty() {
        eyre::bail!("Registry {} holds no usable pools", cli.pools.display());
    }

    let mut scanner = Scanner::new(pools, client);
    scanner.prepare().await;
    Ok(scanner)
}

async fn run_scan(cli: &Cli) -> Result<()> {
    let mut scanner = build_scanner(cli).await?;
    let outcome = scanner.run_cycle().await;
    if cli.json {
        display_outcome_json(&outcome, cli.top);
    } else {
        display_outcome(&outcome, &scanner.token_cache(), cli.top, false);
    }
    Ok(())
}

async fn run_watch(cli: &Cli, interval_ms: u64) -> Result<()> {
    let mut scanner = build_scanner(cli).await?;

    let arb_log_path = init_arb_log();
    eprintln!(
        "\x1b[1;33mARB opportunities are logged to: {}\x1b[0m",
        arb_log_path.canonicalize().unwrap_or(arb_log_path).display()
    );

    let mut poll_interval = interval(Duration::from_millis(interval_ms));
    loop {
        poll_interval.tick().await;
        let outcome = scanner.run_cycle().await;
        if cli.json {
            display_outcome_json(&outcome, cli.top);
        } else {
            display_outcome(&outcome, &scanner.token_cache(), cli.top, true);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Scan) | None => run_scan(&cli).await,
        Some(Commands::Watch { interval_ms }) => run_watch(&cli, interval_ms).await,
    }
}
