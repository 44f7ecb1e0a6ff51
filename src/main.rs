#![forbid(unsafe_code)]

//! `agent-switchboard` — Telegram gateway binary.
//!
//! Validates the environment, starts the worker pool with one warm agent,
//! and runs the Telegram dispatcher until ctrl-c.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agent_switchboard::acp::spawn::SpawnConfig;
use agent_switchboard::config::GlobalConfig;
use agent_switchboard::orchestrator::AppContext;
use agent_switchboard::pool::{AcpLauncher, PoolConfig, WorkerPool};
use agent_switchboard::router::InFlightTracker;
use agent_switchboard::store::{db, BindingStore};
use agent_switchboard::telegram::{run_dispatcher, TelegramGateway};
use agent_switchboard::workspace;
use agent_switchboard::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-switchboard", about = "Telegram gateway for ACP agents", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the workspace base path from the config file.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(base) = args.workspace {
        config.workspace_base_path = base;
    }

    init_tracing(args.log_format, &config);
    info!("agent-switchboard bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(config))
}

fn init_tracing(format: LogFormat, config: &GlobalConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,agent_switchboard={}",
            config.log_level.as_filter()
        ))
    });

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn run(config: GlobalConfig) -> Result<()> {
    // ── Startup validation: fail fast, exit non-zero ────
    let agent_binary = workspace::resolve_agent_binary(&config.agent_name)?;
    if !config.agent_config_path.is_dir() {
        return Err(AppError::Config(format!(
            "agent config template directory {} does not exist",
            config.agent_config_path.display()
        )));
    }
    workspace::ensure_workspace_root(&config.workspace_base_path)?;
    info!(agent = %agent_binary.display(), "startup validation passed");

    // ── Binding store ───────────────────────────────────
    let db_path = config.db_path().to_string_lossy().into_owned();
    let database = Arc::new(db::connect(&db_path).await?);
    let store = BindingStore::new(database);
    info!("binding store connected");

    // ── Worker pool (one warm worker, spawn failure is fatal) ──
    let launcher = Arc::new(AcpLauncher {
        spawn_config: SpawnConfig {
            program: agent_binary.to_string_lossy().into_owned(),
            args: config.agent_args.clone(),
            cwd: config.workspace_base_path.clone(),
        },
    });
    let pool = WorkerPool::start(
        launcher,
        PoolConfig {
            max_workers: config.max_workers as usize,
            idle_timeout: config.idle_timeout(),
        },
    )
    .await?;

    // ── Telegram ────────────────────────────────────────
    let bot = Bot::new(config.bot_token()?);
    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let ctx = Arc::new(AppContext {
        config: Arc::new(config),
        pool: pool.clone(),
        gateway,
        store,
        inflight: InFlightTracker::new(),
    });

    info!("dispatcher starting");
    run_dispatcher(bot, ctx).await;

    // Dispatcher returned: ctrl-c. Tear the pool down before exiting 0.
    pool.shutdown().await;
    info!("graceful shutdown complete");
    Ok(())
}
