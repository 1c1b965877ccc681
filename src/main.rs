//! KALE Missions: price-drop monitor and mission dashboard.
//!
//! Entry point. Loads configuration, initialises structured logging and
//! dispatches to the CLI subcommands. Long-running commands (`start`,
//! `serve`) stop cleanly on Ctrl+C.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use kale_missions::board::chain::{toggle_data_source, ChainMissions, MissionFetcher};
use kale_missions::board::{simulation, DataMode, MissionBoard, SharedBoard};
use kale_missions::config::{AppConfig, PriceSourceKind};
use kale_missions::contracts::{
    ContractInvoker, MissionControllerClient, MockOracleClient, ReflectorReaderClient,
    SorobanInvoker,
};
use kale_missions::dashboard::{self, AppState, ChainAccess, DashboardState};
use kale_missions::monitor::adapters::{
    ControllerLauncher, MockOraclePriceSource, ReflectorPriceSource,
};
use kale_missions::monitor::{self, MonitorSettings, MonitorStatus, PriceMonitor, PriceSource};
use kale_missions::ops::integration::{IntegrationCheck, DEFAULT_REPORT_FILE};
use kale_missions::ops::smoke::{run_smoke, SMOKE_STAKE};
use kale_missions::ops::test_mission_params;
use kale_missions::price::coingecko::CoinGeckoFeed;
use kale_missions::price::{MarketFeed, OracleFeed, PriceService, ReflectorFeed};
use kale_missions::soroban::horizon::HorizonClient;
use kale_missions::soroban::{Keypair, SorobanRpc};
use kale_missions::storage;
use kale_missions::types::{from_units, to_units, MICRO_DECIMALS, STROOP_DECIMALS};

const BANNER: &str = r#"
 _  __    _    _     _____
| |/ /   / \  | |   | ____|
| ' /   / _ \ | |   |  _|
| . \  / ___ \| |___| |___
|_|\_\/_/   \_\_____|_____|

  Crisis missions for the Stellar ecosystem
  v0.1.0
"#;

/// KALE Missions: watch oracle prices and open emergency liquidity missions.
#[derive(Parser, Debug)]
#[command(name = "kale-missions")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Use JSON log format (also enabled by KALE_LOG_JSON)
    #[arg(long, global = true)]
    json_logs: bool,

    /// Skip ASCII art banner
    #[arg(long, global = true)]
    no_banner: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the price monitor (and the dashboard when enabled)
    Start,

    /// Show the saved monitor state, the oracle price and the latest mission
    Status,

    /// Fetch one price and show the current mission
    Test,

    /// Create a mission with a $0.10 trigger price as admin
    CreateTestMission,

    /// Serve the dashboard without the monitor
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Check the deployed contracts and write a JSON report
    Integration {
        #[arg(short, long, default_value = DEFAULT_REPORT_FILE)]
        output: PathBuf,
    },

    /// Create a mission as admin and enlist the configured user
    Smoke {
        /// Stake in stroops
        #[arg(long, default_value_t = SMOKE_STAKE)]
        stake: i128,
    },

    /// Mock oracle administration
    #[command(subcommand)]
    Oracle(OracleCommand),
}

/// Subcommands for `kale-missions oracle`
#[derive(Subcommand, Debug)]
enum OracleCommand {
    /// Set the price (USD) of an asset
    SetPrice {
        price: f64,
        #[arg(long, default_value = "XLM")]
        asset: String,
    },
    /// Lower the price of an asset by a percentage
    Drop {
        percent: u32,
        #[arg(long, default_value = "XLM")]
        asset: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging(cli.json_logs || std::env::var("KALE_LOG_JSON").is_ok());

    let config_path = cli.config.to_string_lossy().to_string();
    let cfg = AppConfig::load(&config_path)?;

    if !cli.no_banner {
        println!("{BANNER}");
    }
    info!(
        network = %cfg.network.name,
        rpc = %cfg.network.rpc_url,
        mission_controller = %cfg.contracts.mission_controller,
        "KALE Missions starting"
    );

    match cli.command {
        Commands::Start => start(&cfg).await,
        Commands::Status => status(&cfg).await,
        Commands::Test => test_fetch(&cfg).await,
        Commands::CreateTestMission => create_test_mission(&cfg).await,
        Commands::Serve { port } => serve(&cfg, port.unwrap_or(cfg.dashboard.port)).await,
        Commands::Integration { output } => integration(&cfg, &output).await,
        Commands::Smoke { stake } => smoke(&cfg, stake).await,
        Commands::Oracle(cmd) => oracle(&cfg, cmd).await,
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Contract clients sharing one RPC-backed invoker.
struct Chain {
    invoker: Arc<dyn ContractInvoker>,
    controller: MissionControllerClient,
    reader: ReflectorReaderClient,
    oracle: MockOracleClient,
}

impl Chain {
    fn connect(cfg: &AppConfig) -> Result<Self> {
        let invoker: Arc<dyn ContractInvoker> = Arc::new(SorobanInvoker::new(
            SorobanRpc::new(&cfg.network.rpc_url)?,
            HorizonClient::new(&cfg.network.horizon_url)?,
            &cfg.network.passphrase,
        ));
        Ok(Self {
            controller: MissionControllerClient::new(invoker.clone(), &cfg.contracts.mission_controller),
            reader: ReflectorReaderClient::new(invoker.clone(), &cfg.contracts.reflector_reader),
            oracle: MockOracleClient::new(invoker.clone(), &cfg.contracts.mock_oracle),
            invoker,
        })
    }

    fn controller(&self, cfg: &AppConfig) -> MissionControllerClient {
        MissionControllerClient::new(self.invoker.clone(), &cfg.contracts.mission_controller)
    }

    fn price_source(&self, cfg: &AppConfig) -> Box<dyn PriceSource> {
        let asset = &cfg.monitor.asset;
        match cfg.monitor.source {
            PriceSourceKind::Reflector => Box::new(ReflectorPriceSource::new(
                ReflectorReaderClient::new(self.invoker.clone(), &cfg.contracts.reflector_reader),
                asset,
            )),
            PriceSourceKind::MockOracle => Box::new(MockOraclePriceSource::new(
                MockOracleClient::new(self.invoker.clone(), &cfg.contracts.mock_oracle),
                asset,
            )),
        }
    }
}

fn admin_keypair(cfg: &AppConfig) -> Result<Keypair> {
    let secret = cfg.admin_secret().context("Admin signing key is required")?;
    Ok(Keypair::from_secret_string(&secret)?)
}

/// Board, price service and dashboard state. Starts in live mode when
/// configured; falls back to demo data if the chain cannot be read.
async fn dashboard_state(
    cfg: &AppConfig,
    chain: &Chain,
    monitor_status: Option<Arc<RwLock<MonitorStatus>>>,
) -> Result<(AppState, Arc<PriceService>)> {
    let board: SharedBoard = Arc::new(RwLock::new(MissionBoard::demo(Utc::now())));
    let oracle: Arc<dyn OracleFeed> = Arc::new(ReflectorFeed::new(
        ReflectorReaderClient::new(chain.invoker.clone(), &cfg.contracts.reflector_reader),
        cfg.monitor.price_decimals,
    ));
    let market: Arc<dyn MarketFeed> =
        Arc::new(CoinGeckoFeed::new(&cfg.price_feed.coingecko_base_url)?);
    let prices = Arc::new(PriceService::new(
        Some(oracle),
        Some(market),
        cfg.price_feed.mock_base_price,
    ));
    let fetcher: Arc<dyn MissionFetcher> =
        Arc::new(ChainMissions::new(chain.controller(cfg), cfg.dashboard.max_missions));

    if cfg.price_feed.live {
        if let Err(e) = toggle_data_source(&board, Some(fetcher.as_ref())).await {
            warn!(error = %e, "Starting with demo data");
        }
    }

    let mut state = DashboardState::new(board, prices.clone(), &cfg.network.name)
        .with_chain(ChainAccess {
            invoker: chain.invoker.clone(),
            controller: chain.controller(cfg),
            fetcher,
        })
        .with_horizon(HorizonClient::new(&cfg.network.horizon_url)?);
    if let Some(status) = monitor_status {
        state = state.with_monitor(status);
    }
    Ok((Arc::new(state), prices))
}

/// Background tasks behind the dashboard.
fn spawn_dashboard_tasks(
    cfg: &AppConfig,
    state: &AppState,
    prices: Arc<PriceService>,
    port: u16,
    shutdown: &watch::Receiver<bool>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut tasks = Vec::new();
    if cfg.dashboard.demo_updates {
        tasks.push(simulation::spawn(state.board.clone(), shutdown.clone()));
    }
    tasks.push(prices.spawn_updates(
        state.board.clone(),
        Duration::from_secs(cfg.price_feed.update_interval_secs),
        shutdown.clone(),
    ));
    tasks.push(dashboard::spawn_dashboard(state.clone(), port, shutdown.clone()));
    tasks
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn start(cfg: &AppConfig) -> Result<()> {
    let chain = Chain::connect(cfg)?;
    let admin = admin_keypair(cfg)?;
    let launcher = ControllerLauncher::new(chain.controller(cfg), admin, cfg.dashboard.max_missions);
    let mut price_monitor = PriceMonitor::new(
        chain.price_source(cfg),
        Box::new(launcher),
        MonitorSettings::from_config(cfg),
    );

    let first = price_monitor.initialize().await?;
    info!(price = first.as_f64(), decimals = first.decimals, "Initial price sample");

    let (stop, shutdown) = monitor::stop_channel();
    let mut tasks = Vec::new();
    if cfg.dashboard.enabled {
        let (state, prices) =
            dashboard_state(cfg, &chain, Some(price_monitor.status_handle())).await?;
        tasks = spawn_dashboard_tasks(cfg, &state, prices, cfg.dashboard.port, &shutdown);
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received.");
        }
        stop.stop();
    });

    info!("Entering monitor loop. Press Ctrl+C to stop.");
    price_monitor.run(shutdown).await;

    for task in tasks {
        let _ = task.await;
    }
    let final_status = price_monitor.status().await;
    info!(
        missions_created = final_status.missions_created,
        history = final_status.history_len,
        "KALE Missions shut down cleanly."
    );
    Ok(())
}

async fn status(cfg: &AppConfig) -> Result<()> {
    match storage::load_state(cfg.monitor.state_file.as_deref())? {
        Some(state) => {
            let latest = state.samples.last();
            println!(
                "Saved monitor state ({}): {} samples, latest {}, missions created {}, last mission {}",
                state.saved_at.to_rfc3339(),
                state.samples.len(),
                latest.map_or("-".to_string(), |s| format!("${:.6}", s.as_f64())),
                state.missions_created,
                state.last_mission_id.map_or("-".to_string(), |id| format!("#{id}")),
            );
        }
        None => println!("No saved monitor state."),
    }

    let chain = Chain::connect(cfg)?;
    let source = chain.price_source(cfg);
    match source.latest_price().await {
        Ok(p) => println!("Oracle ({}): raw price {} at {}", source.label(), p.price, p.timestamp),
        Err(e) => println!("Oracle ({}) unavailable: {e:#}", source.label()),
    }
    match chain.controller.latest_mission(cfg.dashboard.max_missions).await? {
        Some(m) => println!("Latest mission: {m}"),
        None => println!("No missions on the controller yet."),
    }
    Ok(())
}

async fn test_fetch(cfg: &AppConfig) -> Result<()> {
    let chain = Chain::connect(cfg)?;
    let source = chain.price_source(cfg);
    let decimals = match source.decimals().await {
        Ok(d) if d > 0 => d,
        _ => cfg.monitor.price_decimals,
    };
    let price = source.latest_price().await?;
    if price.is_missing() {
        bail!("{} reports no price for {}", source.label(), cfg.monitor.asset);
    }
    println!(
        "{} price: ${:.6} (raw {}, {} decimals, ledger time {})",
        cfg.monitor.asset,
        to_units(price.price, decimals),
        price.price,
        decimals,
        price.timestamp
    );

    match chain.controller.latest_mission(cfg.dashboard.max_missions).await? {
        Some(m) => println!("Current mission: {m}"),
        None => println!("No missions yet."),
    }
    Ok(())
}

async fn create_test_mission(cfg: &AppConfig) -> Result<()> {
    let chain = Chain::connect(cfg)?;
    let admin = admin_keypair(cfg)?;
    let params = test_mission_params(&cfg.monitor.emergency_mission);
    info!(
        trigger = to_units(params.trigger_price, STROOP_DECIMALS),
        target = %params.target_liquidity,
        reward = %params.reward_pool,
        "Creating test mission"
    );
    let id = chain.controller.create_mission(&admin, &params).await?;
    let mission = chain.controller.get_mission(id).await?;
    println!("Created {mission}");
    Ok(())
}

async fn serve(cfg: &AppConfig, port: u16) -> Result<()> {
    let chain = Chain::connect(cfg)?;
    let (state, prices) = dashboard_state(cfg, &chain, None).await?;
    let (stop, shutdown) = monitor::stop_channel();
    let tasks = spawn_dashboard_tasks(cfg, &state, prices, port, &shutdown);

    let mode = state.board.read().await.mode;
    info!(port, mode = ?mode, "Dashboard running. Press Ctrl+C to stop.");
    if mode == DataMode::Demo && !cfg.dashboard.demo_updates {
        warn!("Demo updates disabled; demo prices will stay at their seed values");
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received.");
    stop.stop();
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

async fn integration(cfg: &AppConfig, output: &std::path::Path) -> Result<()> {
    let chain = Chain::connect(cfg)?;
    let report = IntegrationCheck {
        reader: &chain.reader,
        controller: &chain.controller,
        network: &cfg.network.name,
        reflector_oracle: cfg.contracts.reflector_oracle.as_deref(),
        drop_threshold_pct: cfg.monitor.drop_threshold_pct,
        fallback_decimals: cfg.monitor.price_decimals,
    }
    .run()
    .await;

    for check in &report.checks {
        println!("{:<18} {:?}  {}", check.name, check.status, check.detail);
    }
    report.save(&output.to_string_lossy())?;
    if !report.passed() {
        bail!("integration checks failed");
    }
    println!("All integration checks passed.");
    Ok(())
}

async fn smoke(cfg: &AppConfig, stake: i128) -> Result<()> {
    let chain = Chain::connect(cfg)?;
    let admin = admin_keypair(cfg)?;
    let user = Keypair::from_secret_string(&cfg.user_secret()?)?;
    let params = test_mission_params(&cfg.monitor.emergency_mission);

    let outcome = run_smoke(&chain.controller, &admin, &user, &params, stake).await?;
    println!(
        "Smoke test passed: {} | stake {} KALE (tx {})",
        outcome.mission,
        to_units(outcome.stake.kale_staked, STROOP_DECIMALS),
        outcome.enlist_hash
    );
    Ok(())
}

async fn oracle(cfg: &AppConfig, cmd: OracleCommand) -> Result<()> {
    let chain = Chain::connect(cfg)?;
    let admin = admin_keypair(cfg)?;
    match cmd {
        OracleCommand::SetPrice { price, asset } => {
            let micro = from_units(price, MICRO_DECIMALS);
            let receipt = chain.oracle.update_price(&admin, &asset, micro).await?;
            println!("{asset} set to ${price} ({micro} micro units), tx {}", receipt.hash);
        }
        OracleCommand::Drop { percent, asset } => {
            let new_price = chain.oracle.simulate_price_drop(&admin, &asset, percent).await?;
            println!(
                "{asset} dropped {percent}% to ${:.6}",
                to_units(new_price, MICRO_DECIMALS)
            );
        }
    }
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging(json_logging: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kale_missions=info"));

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
