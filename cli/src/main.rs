//! eventrace: watch one contract through a push provider and a pull
//! provider at the same time and log every event each of them reports,
//! so their latencies can be compared.
//!
//! # Usage
//! ```text
//! eventrace --blocknative.api_key <KEY> --infura.api_key <KEY> start
//! eventrace --log.dev false --log.path race.log start
//! eventrace --config race.yaml start
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info, warn};

use eventrace_core::{EventSink, ExitOutcome, Orchestrator, SubscriptionFilter, TracingSink, LOG_SWAP_ABI};
use eventrace_pull::{PullConfig, PullWatcher, WsLogSubscriber};
use eventrace_push::{ApiKey, Endpoint, PushConfig, PushWatcher, WsConnector};

mod config;
mod logging;
mod signals;

use config::RaceConfig;
use logging::LogConfig;

const DEFI5_ADDRESS: &str = "0xfa6de2697D59E88Ed7Fc4dFE5A33daC43565ea41";

#[derive(Parser, Debug)]
#[command(
    name = "eventrace",
    about = "Compare a push provider and a pull provider to see which one picks up contract events faster",
    version
)]
struct Cli {
    /// Human-readable logs on stderr (true) or JSON lines in --log.path (false)
    #[arg(long = "log.dev", default_value_t = true, action = ArgAction::Set, global = true)]
    log_dev: bool,

    /// File to store JSON logs in
    #[arg(long = "log.path", default_value = "eventrace.log", global = true)]
    log_path: PathBuf,

    /// Default log level
    #[arg(long = "log.level", default_value = "info", global = true)]
    log_level: String,

    /// Infura project key
    #[arg(long = "infura.api_key", env = "INFURA_API_KEY", default_value = "", hide_env_values = true, global = true)]
    infura_api_key: String,

    /// Blocknative API key
    #[arg(long = "blocknative.api_key", env = "BLOCKNATIVE_API", default_value = "", hide_env_values = true, global = true)]
    blocknative_api_key: String,

    #[arg(long = "blocknative.scheme", default_value = "wss", global = true)]
    blocknative_scheme: String,

    #[arg(long = "blocknative.host", default_value = "api.blocknative.com", global = true)]
    blocknative_host: String,

    #[arg(long = "blocknative.api_path", default_value = "/v0", global = true)]
    blocknative_api_path: String,

    /// Contract to watch
    #[arg(long = "defi5.address", default_value = DEFI5_ADDRESS, global = true)]
    address: String,

    /// Event ABI fragment to watch (repeatable; defaults to LOG_SWAP)
    #[arg(long = "abi", global = true)]
    abi: Vec<String>,

    /// Load the full provider configuration from a YAML file instead of flags
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start both watchers and run until interrupted
    Start,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            json: !self.log_dev,
            path: self.log_path.clone(),
            ..LogConfig::default()
        }
    }

    fn race_config(&self) -> Result<RaceConfig> {
        if let Some(path) = &self.config {
            return RaceConfig::from_yaml_file(path);
        }
        let abi = if self.abi.is_empty() {
            vec![LOG_SWAP_ABI.to_string()]
        } else {
            self.abi.clone()
        };
        Ok(RaceConfig {
            push: PushConfig::new(
                Endpoint::new(
                    &self.blocknative_scheme,
                    &self.blocknative_host,
                    &self.blocknative_api_path,
                ),
                ApiKey::new(&self.blocknative_api_key),
            ),
            pull: PullConfig::infura(&self.infura_api_key),
            filter: SubscriptionFilter::new(&self.address, abi),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_config()).context("initialising logging")?;

    match cli.command {
        Commands::Start => {
            let config = cli.race_config()?;
            config.validate().context("invalid configuration")?;
            start(config).await;
        }
    }
    Ok(())
}

/// Run both watchers until a shutdown signal, then report how each ended.
async fn start(config: RaceConfig) {
    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);

    let push = PushWatcher::new(
        "blocknative",
        WsConnector::new(),
        config.push,
        config.filter.clone(),
        Arc::clone(&sink),
    );
    let pull = PullWatcher::new(
        "infura",
        WsLogSubscriber::new(config.pull.endpoint_url(), config.pull.subscriber_config()),
        config.filter,
        sink,
    );

    let orchestrator = Orchestrator::new()
        .with_watcher(Arc::new(push))
        .with_watcher(Arc::new(pull));
    info!(watchers = orchestrator.len(), "starting event race");

    let exits = orchestrator.start(signals::shutdown_trigger()).await;
    for exit in exits.iter().filter(|e| !e.is_completed()) {
        match &exit.outcome {
            ExitOutcome::Failed(e) if e.is_recoverable() => {
                warn!(watcher = %exit.name, error = %e, "watcher gave up after a dropped connection")
            }
            ExitOutcome::Failed(e) => warn!(watcher = %exit.name, error = %e, "watcher did not finish cleanly"),
            ExitOutcome::Panicked(msg) => error!(watcher = %exit.name, panic = %msg, "watcher panicked"),
            ExitOutcome::Completed => {}
        }
    }
    info!("event race finished");
}
