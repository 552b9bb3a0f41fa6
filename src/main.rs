//! DeskPilot Agent CLI
//!
//! The `start` subcommand runs the tracking pipeline in the foreground; the
//! other subcommands talk to a running agent through the config file and the
//! persisted status snapshot. OS hook integration is injected behind the
//! monitor/screen traits, so builds without a platform hook backend run in a
//! degraded mode that exercises the full pipeline minus real input.

use clap::{Parser, Subcommand};
use deskpilot_agent::backend::HttpBackend;
use deskpilot_agent::capture::ScriptedScreen;
use deskpilot_agent::config::Config;
use deskpilot_agent::monitor::{ScriptedKeySource, ScriptedProbe};
use deskpilot_agent::status::StatusBoard;
use deskpilot_agent::{Agent, AgentDeps, VERSION};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "deskpilot-agent")]
#[command(version = VERSION)]
#[command(about = "Activity tracking agent with smart capture triggering", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking in the foreground
    Start {
        /// Override the backend base URL
        #[arg(long)]
        backend_url: Option<String>,

        /// Override the backend bearer token
        #[arg(long)]
        token: Option<String>,
    },

    /// Pause a running agent
    Pause,

    /// Resume a paused agent
    Resume,

    /// Show agent status
    Status,

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deskpilot_agent=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { backend_url, token } => cmd_start(backend_url, token),
        Commands::Pause => cmd_pause(),
        Commands::Resume => cmd_resume(),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    }
}

fn cmd_start(backend_url: Option<String>, token: Option<String>) {
    let mut config = Config::load().unwrap_or_default();
    if let Some(url) = backend_url {
        config.backend.base_url = url;
    }
    if let Some(token) = token {
        config.backend.token = token;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    println!("DeskPilot Agent v{VERSION}");
    println!("  Backend: {}", config.backend.base_url);
    println!("  User id: {}", config.backend.user_id);
    if config.paused {
        println!("  Tracking is paused; run `deskpilot-agent resume` to enable captures.");
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_agent(config)) {
        eprintln!("Agent error: {e}");
        std::process::exit(1);
    }
}

async fn run_agent(config: Config) -> anyhow::Result<()> {
    let status = Arc::new(StatusBoard::with_persistence(config.data_path.clone()));

    let http = Arc::new(HttpBackend::new(config.backend.clone()));
    match http.test_connection().await {
        Ok(true) => tracing::info!("backend reachable at {}", config.backend.base_url),
        Ok(false) => tracing::warn!("backend health check failed, continuing degraded"),
        Err(e) => tracing::warn!("backend unreachable ({}), continuing degraded", e),
    }

    let deps = AgentDeps {
        probe: Box::new(ScriptedProbe::new()),
        keys: Box::new(ScriptedKeySource::new()),
        backend: http.clone(),
        reports: http.clone(),
        suggestions: http,
        screen: Arc::new(ScriptedScreen::new()),
    };

    let shutdown = CancellationToken::new();
    let handler_token = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })?;

    Agent::new(config, deps, status)
        .watch_config(true)
        .run(shutdown)
        .await
}

fn cmd_pause() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = true;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Tracking paused. Use 'deskpilot-agent resume' to continue.");
}

fn cmd_resume() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = false;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Tracking resumed.");
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("DeskPilot Agent Status");
    println!("======================");
    println!();
    println!("Paused: {}", config.paused);
    println!();

    match StatusBoard::load_persisted(&config.data_path) {
        Ok(snapshot) => println!("{}", snapshot.summary()),
        Err(_) => println!("No agent session data found."),
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
