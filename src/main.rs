//! SoulSpark Trading Bot
//!
//! # WARNING
//! - This bot trades with real money. Only use funds you can afford to lose.
//! - Most freshly-launched tokens go to zero (rug pulls, abandonment).
//! - The safety gate is heuristic, not a guarantee.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

use soulspark_bot::chain::RpcChainClient;
use soulspark_bot::config::Config;
use soulspark_bot::discovery::{DexScreenerPairsFeed, DiscoveryFeed, PumpFunMintsFeed};
use soulspark_bot::engine::{EngineDeps, TradingEngine};
use soulspark_bot::events::EventSink;
use soulspark_bot::monitor::PriceFeed;
use soulspark_bot::safety::SafetyGate;
use soulspark_bot::state::StateStore;
use soulspark_bot::token_info::{DexScreenerSource, PumpFunSource, TokenInfoResolver, TokenSource};
use soulspark_bot::trading::{OrderExecutor, PumpPortalApi, SimulatedTradeApi, TradeApi};
use soulspark_bot::wallet::WalletRegistry;

/// SoulSpark Trading Bot - autonomous multi-wallet token sniper
#[derive(Parser)]
#[command(name = "soulspark")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading engine
    Run {
        /// Simulate trades instead of hitting the live API
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("soulspark=info".parse()?)
                .add_directive("soulspark_bot=info".parse()?),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Run { dry_run } => run(&config, dry_run).await,
        Commands::Config => {
            println!("{}", config.masked_display());
            Ok(())
        }
    }
}

async fn run(config: &Config, dry_run: bool) -> Result<()> {
    info!("Starting SoulSpark trading engine (dry_run: {})", dry_run);

    let chain = Arc::new(RpcChainClient::new(
        &config.rpc.endpoint,
        config.rpc.timeout_ms,
    ));

    let sources: Vec<Box<dyn TokenSource>> = vec![
        Box::new(DexScreenerSource::with_base_url(
            &config.feeds.dexscreener_endpoint,
        )),
        Box::new(PumpFunSource::with_base_url(&config.feeds.pumpfun_endpoint)),
    ];
    let resolver = Arc::new(TokenInfoResolver::new(sources, chain.clone()));

    let api: Arc<dyn TradeApi> = if dry_run {
        Arc::new(SimulatedTradeApi::new())
    } else {
        Arc::new(
            PumpPortalApi::new(&config.trade_api.url)
                .with_default_key(config.trade_api.default_api_key.clone()),
        )
    };

    let prices: Arc<dyn PriceFeed> = Arc::new(DexScreenerSource::with_base_url(
        &config.feeds.dexscreener_endpoint,
    ));

    let feeds: Vec<Box<dyn DiscoveryFeed>> = vec![
        Box::new(DexScreenerPairsFeed::with_base_url(
            &config.feeds.dexscreener_endpoint,
        )),
        Box::new(PumpFunMintsFeed::with_base_url(
            &config.feeds.pumpapi_endpoint,
        )),
    ];

    let engine = TradingEngine::new(EngineDeps {
        store: StateStore::new(&config.state.path),
        registry: Arc::new(WalletRegistry::new()),
        resolver,
        gate: Arc::new(SafetyGate::new(chain.clone())),
        executor: Arc::new(OrderExecutor::new(api)),
        chain,
        prices,
        feeds,
        events: EventSink::new(config.events.capacity),
    });

    // Restore persisted settings; auto-restart decides whether boot resumes
    // the loop. Without it the engine waits for an explicit start.
    engine.boot().await?;
    if !engine.is_running() {
        engine.start().await;
    }

    info!("Engine ready (running: {})", engine.is_running());
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping engine");

    engine.stop().await;
    // Give in-flight monitors a moment to observe the stop signal and
    // liquidate before the process exits
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    Ok(())
}
